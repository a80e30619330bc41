use serde::{Serialize, Deserialize};

/// 队列中单个片段的状态
///
/// `Queued -> Dispatched -> {Completed | Retrying | Failed}`，
/// `Retrying` 在冷却结束后回到 `Queued`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Queued,
    Dispatched,
    Completed,
    Retrying,
    Failed(String),
}

impl TaskStatus {
    /// 仍在队列生命周期内（对应界面上禁用下载按钮）
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Dispatched | TaskStatus::Retrying)
    }
}
