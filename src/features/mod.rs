/// API Key 认证
pub mod auth;
/// 健康检查
pub mod health;
/// 背景移除
pub mod matting;
