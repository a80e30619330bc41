//! 进度与队列事件的推送通道
//!
//! 基于 `tokio::sync::broadcast`：发送永不阻塞，没有订阅者时事件直接丢弃，
//! 慢订阅者只会收到 `Lagged`，不会拖慢传输。

use std::path::PathBuf;
use serde::{Serialize, Deserialize};
use tokio::sync::broadcast;

/// 界面用于定位片段的附加信息（1 起始序号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressExtra {
    pub module_ordinal: u32,
    pub clip_ordinal: u32,
}

/// 单次传输的进度事件
///
/// `bytes_received` 为累计值；`total_bytes == 0` 表示总大小未知。
/// 订阅方应按 `id` 归并，并丢弃终止事件之后到达的进行中事件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub id: String,
    pub file_name: String,
    pub bytes_received: u64,
    pub total_bytes: u64,
    pub is_downloading: bool,
    pub extra: ProgressExtra,
}

impl TransferProgress {
    /// 总大小未知时返回 None
    pub fn percentage(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            None
        } else {
            Some(self.bytes_received as f64 / self.total_bytes as f64 * 100.0)
        }
    }
}

/// 队列状态变化通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum QueueEvent {
    Dispatched { id: String, title: String, remaining: usize },
    Completed { id: String, path: PathBuf, bytes: u64 },
    Retrying { id: String, title: String, delay_ms: u64, cause: String },
    Failed { id: String, title: String, cause: String },
    Drained,
    Halted { cause: String },
}

/// 事件中心，克隆后共享同一组通道
#[derive(Debug, Clone)]
pub struct EventHub {
    progress: broadcast::Sender<TransferProgress>,
    queue: broadcast::Sender<QueueEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (progress, _) = broadcast::channel(capacity);
        let (queue, _) = broadcast::channel(capacity);
        Self { progress, queue }
    }

    pub fn publish_progress(&self, progress: TransferProgress) {
        let _ = self.progress.send(progress);
    }

    pub fn publish(&self, event: QueueEvent) {
        log::debug!("队列事件: {:?}", event);
        let _ = self.queue.send(event);
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<TransferProgress> {
        self.progress.subscribe()
    }

    pub fn subscribe_queue(&self) -> broadcast::Receiver<QueueEvent> {
        self.queue.subscribe()
    }
}
