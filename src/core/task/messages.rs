use std::collections::HashMap;
use std::sync::Arc;
use actix::Message;
use serde::Serialize;

use crate::core::course::{Course, CourseInfo, DownloadRequest};
use super::state::TaskStatus;

/// 加入单个片段，重复的活动或已完成片段返回 false
pub struct Enqueue {
    pub request: DownloadRequest,
    pub course: Arc<CourseInfo>,
}
impl Message for Enqueue { type Result = bool; }

/// 加入整门课程或其中一个章节（从 1 开始），返回实际加入的片段数
pub struct EnqueueCourse {
    pub course: Arc<Course>,
    pub module: Option<u32>,
}
impl Message for EnqueueCourse { type Result = usize; }

/// 查询队列快照
pub struct QueryQueue;
impl Message for QueryQueue { type Result = QueueSnapshot; }

/// 查询单个片段状态
pub struct QueryTaskStatus {
    pub id: String,
}
impl Message for QueryTaskStatus { type Result = Option<TaskStatus>; }

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// 等待中的片段，按出队顺序
    pub queued: Vec<String>,
    pub dispatched: Option<String>,
    pub statuses: HashMap<String, TaskStatus>,
    pub halted: bool,
}

impl QueueSnapshot {
    pub fn count(&self, pred: impl Fn(&TaskStatus) -> bool) -> usize {
        self.statuses.values().filter(|s| pred(s)).count()
    }
}
