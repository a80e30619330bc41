use std::time::Duration;
use rand::Rng;
use crate::core::error::DownloadError;

/// 重试策略
///
/// 限流信号使用固定冷却时间；其它临时故障在区间内随机取值，
/// 避免多个客户端同时重试。
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    pub max_retries: u32,
    pub throttle_cooldown: Duration,
    pub transient_delay_min: Duration,
    pub transient_delay_max: Duration,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            throttle_cooldown: Duration::from_secs(30),
            transient_delay_min: Duration::from_secs(20),
            transient_delay_max: Duration::from_secs(30),
        }
    }
}

/// 一次失败之后的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

impl RetryStrategy {
    pub fn should_retry(&self, error: &DownloadError, retry_count: u32) -> bool {
        retry_count < self.max_retries && error.is_retryable()
    }

    pub fn get_delay(&self, error: &DownloadError) -> Duration {
        if error.is_throttled() {
            return self.throttle_cooldown;
        }
        let (min, max) = (self.transient_delay_min, self.transient_delay_max);
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }

    pub fn decide(&self, error: &DownloadError, retry_count: u32) -> RetryDecision {
        if self.should_retry(error, retry_count) {
            RetryDecision::Retry(self.get_delay(error))
        } else {
            RetryDecision::GiveUp
        }
    }
}

/// 单个片段的重试记录
#[derive(Debug, Clone, Default)]
pub struct RetryContext {
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub retry_history: Vec<(String, Duration)>,
    pub total_retry_time: Duration,
}

impl RetryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_retry(&mut self, error: &DownloadError, delay: Duration) {
        self.retry_count += 1;
        self.last_error = Some(error.to_string());
        self.retry_history.push((error.to_string(), delay));
        self.total_retry_time += delay;
    }

    pub fn get_retry_stats(&self) -> RetryStats {
        RetryStats {
            total_retries: self.retry_count,
            total_retry_time: self.total_retry_time,
        }
    }
}

/// 重试统计信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStats {
    pub total_retries: u32,
    pub total_retry_time: Duration,
}
