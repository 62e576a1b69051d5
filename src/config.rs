use config::{Config as ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 日志格式
    pub format: String,
}

/// API Key 认证配置
///
/// `api_key` 为空时认证关闭，所有请求直接放行；配置后每个处理请求
/// 必须携带匹配的 `X-API-Key` 头。封禁参数仅在认证开启时生效。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// 期望的 API Key（缺省时从环境变量 API_KEY 读取）
    #[serde(default = "AuthConfig::default_api_key")]
    pub api_key: Option<String>,
    /// 窗口内允许的最大失败次数
    #[serde(default = "AuthConfig::default_max_failed_attempts")]
    pub max_failed_attempts: u32,
    /// 失败计数窗口（秒）
    #[serde(default = "AuthConfig::default_attempt_window")]
    pub attempt_window_secs: u64,
    /// 封禁时长（秒）
    #[serde(default = "AuthConfig::default_block_duration")]
    pub block_duration_secs: u64,
    /// 失败记录表容量（按来源 IP 计，LRU 淘汰）
    #[serde(default = "AuthConfig::default_throttle_capacity")]
    pub throttle_capacity: usize,
}

impl AuthConfig {
    fn default_api_key() -> Option<String> {
        std::env::var("API_KEY").ok().filter(|s| !s.is_empty())
    }
    fn default_max_failed_attempts() -> u32 {
        5
    }
    fn default_attempt_window() -> u64 {
        60
    }
    fn default_block_duration() -> u64 {
        900
    }
    fn default_throttle_capacity() -> usize {
        50_000
    }

    /// 认证是否启用
    pub fn enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub fn attempt_window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.attempt_window_secs)
    }

    pub fn block_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.block_duration_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: Self::default_api_key(),
            max_failed_attempts: Self::default_max_failed_attempts(),
            attempt_window_secs: Self::default_attempt_window(),
            block_duration_secs: Self::default_block_duration(),
            throttle_capacity: Self::default_throttle_capacity(),
        }
    }
}

/// CORS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// 是否启用 CORS
    #[serde(default = "CorsConfig::default_enabled")]
    pub enabled: bool,
    /// 允许的 Origin 列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// 允许的方法列表（缺省为 POST/GET）
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    /// 允许的请求头列表（缺省为 X-API-Key/Content-Type）
    #[serde(default)]
    pub allowed_headers: Vec<String>,
}

impl CorsConfig {
    fn default_enabled() -> bool {
        false
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            allowed_origins: Vec::new(),
            allowed_methods: Vec::new(),
            allowed_headers: Vec::new(),
        }
    }
}

/// 上传限制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 单个上传文件的最大字节数
    #[serde(default = "UploadConfig::default_max_bytes")]
    pub max_bytes: usize,
}

impl UploadConfig {
    fn default_max_bytes() -> usize {
        20 * 1024 * 1024
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: Self::default_max_bytes(),
        }
    }
}

/// 推理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// ONNX 模型文件路径
    #[serde(default = "InferenceConfig::default_model_path")]
    pub model_path: String,
    /// 模型缺失时的下载地址（为空则要求文件已就位）
    #[serde(default)]
    pub model_url: Option<String>,
    /// 模型输入边长（正方形，预处理时按此缩放）
    #[serde(default = "InferenceConfig::default_input_size")]
    pub input_size: u32,
    /// 单次请求的推理超时（秒）
    #[serde(default = "InferenceConfig::default_timeout")]
    pub timeout_secs: u64,
    /// 并发推理许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
    /// ONNX Runtime 线程数
    #[serde(default = "InferenceConfig::default_intra_threads")]
    pub intra_threads: usize,
}

impl InferenceConfig {
    fn default_model_path() -> String {
        "./resources/models/matting.onnx".to_string()
    }
    fn default_input_size() -> u32 {
        512
    }
    fn default_timeout() -> u64 {
        120
    }
    fn default_intra_threads() -> usize {
        4
    }

    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }

    pub fn model_path(&self) -> PathBuf {
        PathBuf::from(&self.model_path)
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model_path: Self::default_model_path(),
            model_url: None,
            input_size: Self::default_input_size(),
            timeout_secs: Self::default_timeout(),
            max_parallel: 0,
            intra_threads: Self::default_intra_threads(),
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 优雅退出超时时间（秒）
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }

    /// 获取优雅退出超时时间
    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// 应用配置
///
/// 在进程入口构造一次，此后只读；通过 `AppState` 显式传入各请求处理
/// 组件，不提供全局单例。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    /// API Key 认证配置
    pub auth: AuthConfig,
    /// CORS 配置
    pub cors: CorsConfig,
    /// 上传限制配置
    pub upload: UploadConfig,
    /// 推理配置
    pub inference: InferenceConfig,
    /// 优雅退出配置
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    ///
    /// 配置文件可缺省（纯环境变量部署，如容器场景）。
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置（文件可缺省）", config_path);

        let builder = ConfigBuilder::builder()
            // 加载配置文件
            .add_source(
                File::with_name(config_path.to_str().unwrap_or("config"))
                    .format(FileFormat::Toml)
                    .required(false),
            )
            // 支持环境变量覆盖，例如：APP_SERVER_PORT
            .add_source(
                Environment::with_prefix("APP")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 获取配置文件路径
    fn get_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, AuthConfig};

    #[test]
    fn defaults_match_service_contract() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.upload.max_bytes, 20 * 1024 * 1024);
        assert_eq!(cfg.inference.timeout_secs, 120);
        assert_eq!(cfg.auth.max_failed_attempts, 5);
        assert_eq!(cfg.auth.attempt_window_secs, 60);
        assert_eq!(cfg.auth.block_duration_secs, 900);
    }

    #[test]
    fn auth_disabled_without_key() {
        let cfg = AuthConfig {
            api_key: None,
            ..AuthConfig::default()
        };
        assert!(!cfg.enabled());

        let cfg = AuthConfig {
            api_key: Some(String::new()),
            ..AuthConfig::default()
        };
        assert!(!cfg.enabled());

        let cfg = AuthConfig {
            api_key: Some("secret".into()),
            ..AuthConfig::default()
        };
        assert!(cfg.enabled());
    }
}
