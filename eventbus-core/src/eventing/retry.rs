//! 重试策略（RetryPolicy）
//!
//! 纯函数式的指数退避：`delay_for(attempt) = base_delay * 2^attempt`，
//! `attempt` 从 0 开始计第一次重试，首次尝试永不延迟。实际挂起由调用方负责。
//!
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 首次尝试之后允许的最大重试次数
    pub max_retries: u32,
    /// 退避基数
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// 第 `attempt` 次重试前的等待时长（溢出时饱和）
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// 第 `attempt` 次尝试失败后是否还能重试
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES, Self::DEFAULT_BASE_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries, 3);
        assert_eq!(p.base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let p = RetryPolicy::new(5, Duration::from_millis(10));
        let delays: Vec<u128> = (0..4).map(|a| p.delay_for(a).as_millis()).collect();
        assert_eq!(delays, vec![10, 20, 40, 80]);
    }

    #[test]
    fn delay_saturates_instead_of_overflowing() {
        let p = RetryPolicy::new(u32::MAX, Duration::from_secs(u64::MAX / 2));
        assert_eq!(p.delay_for(40), Duration::MAX);
    }

    #[test]
    fn retry_bound() {
        let p = RetryPolicy::new(2, Duration::ZERO);
        assert!(p.should_retry(0));
        assert!(p.should_retry(1));
        assert!(!p.should_retry(2));
        assert!(!RetryPolicy::new(0, Duration::ZERO).should_retry(0));
    }
}
