//! 优雅退出管理模块
//!
//! 把 SIGINT/SIGTERM（Windows 下为 Ctrl+C）统一收敛成一次退出通知，
//! 供 HTTP 服务器的 graceful shutdown 等待。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::{debug, info};

/// 退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 用户中断信号 (Ctrl+C)
    Interrupt,
    /// 终止信号 (SIGTERM)
    Terminate,
    /// 应用请求退出
    Application,
}

#[derive(Debug)]
struct ShutdownInner {
    notify: Notify,
    shutting_down: AtomicBool,
    reason: std::sync::Mutex<Option<ShutdownReason>>,
}

/// 优雅退出管理器
#[derive(Debug, Clone)]
pub struct ShutdownManager {
    inner: Arc<ShutdownInner>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownInner {
                notify: Notify::new(),
                shutting_down: AtomicBool::new(false),
                reason: std::sync::Mutex::new(None),
            }),
        }
    }

    /// 是否已经触发退出
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// 触发优雅退出；重复触发只记录第一次的原因。
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        let first = self
            .inner
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();

        if first {
            info!("触发优雅退出: {:?}", reason);
            if let Ok(mut guard) = self.inner.reason.lock() {
                *guard = Some(reason);
            }
            self.inner.notify.notify_waiters();
        } else {
            debug!("重复的退出信号被忽略: {:?}", reason);
        }
    }

    /// 等待退出信号，返回退出原因。
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        if !self.is_shutting_down() {
            self.inner.notify.notified().await;
        }
        self.inner
            .reason
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .unwrap_or(ShutdownReason::Application)
    }

    /// 启动平台信号监听任务。
    pub fn start_signal_handler(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            let reason = wait_for_signal().await;
            manager.trigger_shutdown(reason);
        });
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> ShutdownReason {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("注册 SIGINT 处理失败: {}", e);
            std::future::pending::<()>().await;
            unreachable!()
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("注册 SIGTERM 处理失败: {}", e);
            std::future::pending::<()>().await;
            unreachable!()
        }
    };

    tokio::select! {
        _ = interrupt.recv() => ShutdownReason::Interrupt,
        _ = terminate.recv() => ShutdownReason::Terminate,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> ShutdownReason {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("注册 Ctrl+C 处理失败: {}", e);
        std::future::pending::<()>().await;
    }
    ShutdownReason::Interrupt
}

#[cfg(test)]
mod tests {
    use super::{ShutdownManager, ShutdownReason};
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_waiter_with_reason() {
        let manager = ShutdownManager::new();
        let waiter = manager.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_shutdown().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.trigger_shutdown(ShutdownReason::Terminate);

        let reason = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .expect("waiter task should not panic");
        assert_eq!(reason, ShutdownReason::Terminate);
    }

    #[tokio::test]
    async fn first_reason_wins() {
        let manager = ShutdownManager::new();
        manager.trigger_shutdown(ShutdownReason::Interrupt);
        manager.trigger_shutdown(ShutdownReason::Terminate);
        assert_eq!(
            manager.wait_for_shutdown().await,
            ShutdownReason::Interrupt
        );
    }

    #[tokio::test]
    async fn wait_after_trigger_returns_immediately() {
        let manager = ShutdownManager::new();
        manager.trigger_shutdown(ShutdownReason::Application);
        assert!(manager.is_shutting_down());
        let reason = tokio::time::timeout(Duration::from_millis(100), manager.wait_for_shutdown())
            .await
            .expect("should not block after trigger");
        assert_eq!(reason, ShutdownReason::Application);
    }
}
