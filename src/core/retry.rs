//! 限流重试策略
//!
//! 只对 LlmError::RateLimited 重试：第 k 次失败后等待 min(base * 2^k, max)，
//! 其余错误原样立即返回；次数用尽仍被限流时返回 RetriesExhausted。

use std::future::Future;
use std::time::Duration;

use crate::llm::LlmError;

/// 重试配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// 最多尝试次数（含第一次）
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// 第 attempt 次（从 1 开始）失败后的等待时长
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// 执行 operation，限流时指数退避重试
pub async fn retry_with_backoff<T, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let max_attempts = config.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limited() => {
                if attempt == max_attempts {
                    break;
                }
                let delay = config.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "rate limit hit, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
    tracing::error!(attempts = max_attempts, "rate limit retries exhausted");
    Err(LlmError::RetriesExhausted {
        attempts: max_attempts,
    })
}
