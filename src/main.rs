use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa_swagger_ui::SwaggerUi;

use matting_backend::features::health::handler::health_check;
use matting_backend::features::matting::{BackgroundRemover, MattingSession, create_matting_router};
use matting_backend::startup::run_startup_checks;
use matting_backend::state::AppState;
use matting_backend::{ShutdownManager, config::AppConfig};

#[derive(OpenApi)]
#[openapi(
    paths(
        matting_backend::features::matting::handler::remove_bg,
        matting_backend::features::health::handler::health_check,
    ),
    components(
        schemas(
            matting_backend::error::AppError,
            matting_backend::error::MattingError,
            matting_backend::error::ProblemDetails,
            matting_backend::features::health::handler::HealthResponse,
            matting_backend::features::matting::handler::RemoveBgForm,
        )
    ),
    modifiers(&ApiKeySecurity),
    tags(
        (name = "Matting", description = "Background removal APIs"),
        (name = "Health", description = "Health APIs"),
    ),
    info(
        title = "Matting Backend API",
        version = "0.1.0",
        description = "Background removal service (Axum)"
    )
)]
pub struct ApiDoc;

struct ApiKeySecurity;

impl Modify for ApiKeySecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "ApiKey",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
        );
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matting_backend=info,tower_http=info".into()),
        )
        .init();

    // 创建优雅退出管理器
    let shutdown_manager = ShutdownManager::new();

    // Load config
    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Config init failed: {}", e);
            std::process::exit(1);
        }
    };
    if config.auth.enabled() {
        tracing::info!("API Key 认证已启用");
    } else {
        tracing::warn!("未配置 API Key，处理接口对所有请求开放");
    }

    // 启动信号处理器
    shutdown_manager.start_signal_handler();

    // Run startup checks（含模型权重下载）
    if let Err(e) = run_startup_checks(&config).await {
        tracing::error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    // 模型加载是阻塞 IO + 大块内存初始化，放到阻塞线程执行
    let inference_cfg = config.inference.clone();
    let remover: Arc<dyn BackgroundRemover> =
        match tokio::task::spawn_blocking(move || MattingSession::load(&inference_cfg)).await {
            Ok(Ok(session)) => Arc::new(session),
            Ok(Err(e)) => {
                tracing::error!("模型初始化失败: {}", e);
                std::process::exit(1);
            }
            Err(e) => {
                tracing::error!("模型加载任务执行失败: {}", e);
                std::process::exit(1);
            }
        };

    let cors_layer = matting_backend::cors::build_cors_layer(&config.cors);
    let shutdown_timeout = config.shutdown.timeout_duration();
    let addr = config.server_addr();

    // Shared state
    let state = AppState::new(config, remover);

    // Routes
    let mut app = Router::<AppState>::new()
        .route("/health", get(health_check))
        .merge(create_matting_router(&state))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state);

    // 全局 request_id 中间件（错误响应会回填 id）
    app = app.layer(axum::middleware::from_fn(
        matting_backend::request_id::request_id_middleware,
    ));

    if let Some(cors) = cors_layer {
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("RemoveBg API: http://{}/remove-bg", addr);

    // 启动服务器并等待优雅退出信号
    let graceful = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let reason = shutdown_manager.wait_for_shutdown().await;
        tracing::info!("接收到退出信号: {:?}，开始优雅关闭HTTP服务器...", reason);

        // 超时兜底：在途请求迟迟不结束时强制退出
        tokio::spawn(async move {
            tokio::time::sleep(shutdown_timeout).await;
            tracing::warn!("优雅退出超时（{}秒），强制退出", shutdown_timeout.as_secs());
            std::process::exit(1);
        });
    });

    if let Err(e) = graceful.await {
        tracing::error!("服务器运行错误: {}", e);
        std::process::exit(1);
    }

    tracing::info!("服务器已优雅关闭");
}
