//! Core: 下载队列、单片段传输、限速、落盘和错误分类等核心逻辑模块

pub mod actor_manager;
pub mod companion;
pub mod course;
pub mod error;
pub mod events;
pub mod metadata;
pub mod placement;
pub mod source;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

// 只导出主流程和其它模块实际用到的类型
pub use actor_manager::DownloadQueueActor;
pub use error::{DownloadError, DownloadResult};
pub use events::{EventHub, QueueEvent, TransferProgress};
pub use task::{Enqueue, EnqueueCourse, QueryQueue, QueryTaskStatus, QueueSnapshot, TaskStatus};
