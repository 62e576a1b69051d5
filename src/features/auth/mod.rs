pub mod api_key;
pub mod throttle;

// 对外导出中间件与校验器，便于 main.rs / 路由装配引用
pub use api_key::{ApiKeyGuard, api_key_middleware, client_ip};
pub use throttle::FailureThrottle;
