//! `task` 模块包含了与单个片段传输相关的所有逻辑
//!
//! 主要包括：
//! - `state`: 片段状态 `TaskStatus`
//! - `messages`: 发给队列 Actor 的消息
//! - `download`: 单次传输 `TransferExecutor`
//! - `retry`: 重试策略
//! - `util`: 限速器 `SpeedLimiter` 和 `RateLimiter`

pub mod state;
pub mod messages;
pub mod download;
pub mod retry;
pub mod util;

pub use messages::{Enqueue, EnqueueCourse, QueryQueue, QueryTaskStatus, QueueSnapshot};
pub use state::TaskStatus;
pub use self::download::{FinalFile, TransferExecutor, TransferSettings};
pub use self::retry::{RetryStrategy, RetryContext, RetryStats};
pub use self::util::{RateLimiter, SpeedLimiter};
