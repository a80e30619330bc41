use std::time::{Duration, Instant};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use crate::core::error::DownloadError;

/// 速度限制器
///
/// 每次放行前先记账：窗口内累计字节数除以上限得到最早可用时间，
/// 调用方需要等待到该时间点。窗口每过 `window_size` 重置一次，
/// 消费方停顿后最多只能补回一个窗口的额度。
/// `max_speed == 0` 表示不限速。
#[derive(Debug)]
pub struct SpeedLimiter {
    pub max_speed: u64, // B/s
    pub window_size: Duration,
    window_start: Instant,
    window_bytes: u64,
}

impl SpeedLimiter {
    pub fn new(max_speed: u64) -> Self {
        Self {
            max_speed,
            window_size: Duration::from_secs(1),
            window_start: Instant::now(),
            window_bytes: 0,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_speed == 0
    }

    /// 记入 `bytes` 并返回放行前需要等待的时间
    pub fn wait_if_needed(&mut self, bytes: u64) -> Duration {
        if self.is_unlimited() {
            return Duration::ZERO;
        }
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.window_size {
            self.window_start = now;
            self.window_bytes = 0;
        }
        self.window_bytes += bytes;
        let due = self.window_start
            + Duration::from_secs_f64(self.window_bytes as f64 / self.max_speed as f64);
        due.saturating_duration_since(now)
    }
}

/// 单个片段的限速上限：按播放时长折算的平均码率乘以倍数，
/// 再受全局上限约束。大小或时长未知时返回 0（不限速），
/// 除非设置了全局上限。
pub fn clip_max_speed(duration_secs: u64, total_bytes: u64, multiplier: u64, cap: u64) -> u64 {
    let by_duration = if duration_secs == 0 || total_bytes == 0 {
        0
    } else {
        total_bytes.div_ceil(duration_secs).saturating_mul(multiplier)
    };
    match (by_duration, cap) {
        (0, cap) => cap,
        (speed, 0) => speed,
        (speed, cap) => speed.min(cap),
    }
}

/// 限速读取包装
///
/// 把底层字节流重新分成 `max_len` 大小的块（最后一块可能更短），
/// 每块按 [`SpeedLimiter`] 放行，块的大小与传输层的分帧无关。
/// 上限只能在第一次读取前修改。底层流的错误原样返回，
/// 错误前已经收到的字节先作为一块交出。
pub struct RateLimiter<S> {
    inner: S,
    limiter: SpeedLimiter,
    pending: Bytes,
    failed: Option<DownloadError>,
    exhausted: bool,
    started: bool,
}

impl<S> RateLimiter<S>
where
    S: Stream<Item = Result<Bytes, DownloadError>> + Unpin,
{
    pub fn new(inner: S, max_bytes_per_second: u64) -> Self {
        Self {
            inner,
            limiter: SpeedLimiter::new(max_bytes_per_second),
            pending: Bytes::new(),
            failed: None,
            exhausted: false,
            started: false,
        }
    }

    pub fn max_bytes_per_second(&self) -> u64 {
        self.limiter.max_speed
    }

    /// 修改上限；读取开始后拒绝修改并返回 false
    pub fn set_max_bytes_per_second(&mut self, max_bytes_per_second: u64) -> bool {
        if self.started {
            log::warn!("传输已开始，忽略限速修改: {} B/s", max_bytes_per_second);
            return false;
        }
        self.limiter = SpeedLimiter::new(max_bytes_per_second);
        true
    }

    /// 读取下一块，流结束时返回 `Ok(None)`
    pub async fn read(&mut self, max_len: usize) -> Result<Option<Bytes>, DownloadError> {
        if !self.started {
            self.started = true;
            self.limiter = SpeedLimiter::new(self.limiter.max_speed);
        }
        if let Some(e) = self.failed.take() {
            return Err(e);
        }
        let max_len = max_len.max(1);
        let mut chunk = BytesMut::with_capacity(max_len);
        while chunk.len() < max_len {
            if self.pending.is_empty() {
                if self.exhausted {
                    break;
                }
                match self.inner.next().await {
                    Some(Ok(bytes)) => self.pending = bytes,
                    Some(Err(e)) if chunk.is_empty() => return Err(e),
                    Some(Err(e)) => {
                        self.failed = Some(e);
                        break;
                    }
                    None => self.exhausted = true,
                }
                continue;
            }
            let take = (max_len - chunk.len()).min(self.pending.len());
            chunk.extend_from_slice(&self.pending.split_to(take));
        }
        if chunk.is_empty() {
            return Ok(None);
        }
        let wait = self.limiter.wait_if_needed(chunk.len() as u64);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        Ok(Some(chunk.freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn byte_stream(parts: Vec<Vec<u8>>) -> impl Stream<Item = Result<Bytes, DownloadError>> + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
    }

    #[test]
    fn test_unlimited_never_waits() {
        let mut limiter = SpeedLimiter::new(0);
        assert!(limiter.is_unlimited());
        assert_eq!(limiter.wait_if_needed(10 * 1024 * 1024), Duration::ZERO);
    }

    #[test]
    fn test_limiter_paces_bytes() {
        let mut limiter = SpeedLimiter::new(1000);
        let wait = limiter.wait_if_needed(500);
        assert!(wait > Duration::from_millis(400) && wait <= Duration::from_millis(500));
    }

    #[test]
    fn test_clip_max_speed() {
        assert_eq!(clip_max_speed(100, 1_000_000, 2, 0), 20_000);
        assert_eq!(clip_max_speed(0, 1_000_000, 2, 0), 0);
        assert_eq!(clip_max_speed(100, 0, 2, 0), 0);
        assert_eq!(clip_max_speed(100, 1_000_000, 2, 5_000), 5_000);
        assert_eq!(clip_max_speed(0, 1_000_000, 2, 5_000), 5_000);
        // 不足 1 B/s 时向上取整，避免退化为不限速
        assert_eq!(clip_max_speed(60, 10, 1, 0), 1);
    }

    #[actix_rt::test]
    async fn test_read_splits_into_chunks() {
        let mut reader = RateLimiter::new(byte_stream(vec![vec![1u8; 2500], vec![], vec![2u8; 10]]), 0);
        let mut sizes = Vec::new();
        while let Some(chunk) = reader.read(1024).await.unwrap() {
            sizes.push(chunk.len());
        }
        assert_eq!(sizes, vec![1024, 1024, 462]);
        assert!(reader.read(1024).await.unwrap().is_none());
    }

    #[actix_rt::test]
    async fn test_read_joins_small_parts() {
        let mut reader = RateLimiter::new(byte_stream(vec![vec![0u8; 512]; 6]), 0);
        let mut sizes = Vec::new();
        while let Some(chunk) = reader.read(1024).await.unwrap() {
            sizes.push(chunk.len());
        }
        assert_eq!(sizes, vec![1024, 1024, 1024]);
    }

    #[actix_rt::test]
    async fn test_read_respects_ceiling() {
        let mut reader = RateLimiter::new(byte_stream(vec![vec![0u8; 3072]]), 6144);
        let started = Instant::now();
        let mut total = 0;
        while let Some(chunk) = reader.read(1024).await.unwrap() {
            total += chunk.len();
        }
        assert_eq!(total, 3072);
        // 3072 B / 6144 B/s = 0.5s，预留调度误差
        assert!(started.elapsed() >= Duration::from_millis(480));
    }

    #[actix_rt::test]
    async fn test_ceiling_frozen_after_first_read() {
        let mut reader = RateLimiter::new(byte_stream(vec![vec![0u8; 8]]), 0);
        assert!(reader.set_max_bytes_per_second(4096));
        reader.read(4).await.unwrap();
        assert!(!reader.set_max_bytes_per_second(1));
        assert_eq!(reader.max_bytes_per_second(), 4096);
    }

    #[actix_rt::test]
    async fn test_stream_error_propagates() {
        let parts: Vec<Result<Bytes, DownloadError>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(DownloadError::transport("connection reset")),
        ];
        let mut reader = RateLimiter::new(stream::iter(parts), 0);
        assert_eq!(reader.read(1024).await.unwrap().as_deref(), Some(&b"abc"[..]));
        let err = reader.read(1024).await.unwrap_err();
        assert!(matches!(err, DownloadError::Transport(_)));
    }
}
