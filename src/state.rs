use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::AppConfig;
use crate::features::auth::ApiKeyGuard;
use crate::features::matting::BackgroundRemover;

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 进程入口构造的只读配置
    pub config: Arc<AppConfig>,
    /// 背景移除实现（生产为 ONNX 推理会话，测试可替换为桩实现）
    pub remover: Arc<dyn BackgroundRemover>,
    /// 控制并发推理的信号量（限制 CPU 密集型任务数量）
    pub inference_semaphore: Arc<Semaphore>,
    /// API Key 校验与失败封禁状态
    pub auth: Arc<ApiKeyGuard>,
}

impl AppState {
    /// 由配置与移除实现组装共享状态。
    pub fn new(config: AppConfig, remover: Arc<dyn BackgroundRemover>) -> Self {
        let permits = {
            let m = config.inference.max_parallel as usize;
            if m == 0 { num_cpus::get() } else { m }
        };
        let auth = Arc::new(ApiKeyGuard::new(&config.auth));
        Self {
            config: Arc::new(config),
            remover,
            inference_semaphore: Arc::new(Semaphore::new(permits)),
            auth,
        }
    }
}
