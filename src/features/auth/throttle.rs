use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::RwLock;

use crate::config::AuthConfig;

/// 单个来源 IP 的失败记录
#[derive(Debug, Default, Clone)]
struct IpRecord {
    /// 窗口内的失败时间点
    attempts: Vec<Instant>,
    /// 进入封禁的时间点
    blocked_at: Option<Instant>,
}

/// 按来源 IP 统计认证失败并在超限后临时封禁。
///
/// 记录表用 LRU 限制容量；窗口与封禁都是惰性过期，读到过期记录时
/// 顺手清掉，不跑后台清理任务。
#[derive(Debug)]
pub struct FailureThrottle {
    max_failed_attempts: usize,
    attempt_window: Duration,
    block_duration: Duration,
    inner: RwLock<LruCache<String, IpRecord>>,
}

impl FailureThrottle {
    pub fn new(cfg: &AuthConfig) -> Self {
        let capacity = NonZeroUsize::new(cfg.throttle_capacity.max(1)).expect("capacity >= 1");
        Self {
            max_failed_attempts: cfg.max_failed_attempts.max(1) as usize,
            attempt_window: cfg.attempt_window(),
            block_duration: cfg.block_duration(),
            inner: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// 该 IP 当前是否处于封禁期。封禁过期时连同失败计数一起清除。
    pub async fn is_blocked(&self, ip: &str) -> bool {
        let mut guard = self.inner.write().await;
        let expired = match guard.get(ip) {
            Some(record) => match record.blocked_at {
                Some(at) if at.elapsed() < self.block_duration => return true,
                Some(_) => true,
                None => false,
            },
            None => false,
        };
        if expired {
            guard.pop(ip);
        }
        false
    }

    /// 记录一次认证失败；返回该 IP 是否因此进入封禁。
    pub async fn record_failure(&self, ip: &str) -> bool {
        let now = Instant::now();
        let mut guard = self.inner.write().await;
        let record = guard.get_or_insert_mut(ip.to_string(), IpRecord::default);

        record
            .attempts
            .retain(|t| now.duration_since(*t) < self.attempt_window);
        record.attempts.push(now);

        if record.attempts.len() >= self.max_failed_attempts {
            record.blocked_at = Some(now);
            true
        } else {
            false
        }
    }
}
