use actix::prelude::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use crate::core::companion::CompanionWriter;
use crate::core::course::{CourseInfo, DownloadRequest};
use crate::core::error::DownloadError;
use crate::core::events::{EventHub, QueueEvent};
use crate::core::task::download::{FinalFile, TransferExecutor};
use crate::core::task::messages::{Enqueue, EnqueueCourse, QueryQueue, QueryTaskStatus, QueueSnapshot};
use crate::core::task::retry::{RetryContext, RetryDecision, RetryStrategy};
use crate::core::task::state::TaskStatus;

/// ================== 队列条目 ==================
struct QueueEntry {
    request: DownloadRequest,
    course: Arc<CourseInfo>,
    status: TaskStatus,
    retry: RetryContext,
}

impl QueueEntry {
    fn new(request: DownloadRequest, course: Arc<CourseInfo>) -> Self {
        Self {
            request,
            course,
            status: TaskStatus::Queued,
            retry: RetryContext::new(),
        }
    }
}

/// 下载队列 Actor
///
/// 按先进先出顺序逐个派发，任意时刻最多一个片段在传输。
/// 失败后按重试策略冷却再排到队尾，认证失败直接标记失败，
/// 磁盘已满或无权限时整个队列停止派发。
pub struct DownloadQueueActor {
    strategy: RetryStrategy,
    executor: Rc<TransferExecutor>,
    companions: Rc<CompanionWriter>,
    hub: EventHub,
    backlog: VecDeque<String>,
    entries: HashMap<String, QueueEntry>,
    dispatched: Option<String>,
    companions_done: HashSet<String>,
    halted: Option<String>,
    /// 上次清空后是否已经发出过 Drained
    drained: bool,
}

impl Actor for DownloadQueueActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        log::debug!("下载队列已启动 (最多重试 {} 次)", self.strategy.max_retries);
    }
}

impl DownloadQueueActor {
    pub fn new(
        executor: Rc<TransferExecutor>,
        companions: Rc<CompanionWriter>,
        strategy: RetryStrategy,
        hub: EventHub,
    ) -> Self {
        Self {
            strategy,
            executor,
            companions,
            hub,
            backlog: VecDeque::new(),
            entries: HashMap::new(),
            dispatched: None,
            companions_done: HashSet::new(),
            halted: None,
            drained: true,
        }
    }

    /// 加入一个片段，不触发派发
    fn admit(&mut self, request: DownloadRequest, course: Arc<CourseInfo>) -> bool {
        if let Some(cause) = &self.halted {
            log::warn!("队列已停止 ({})，忽略 {}", cause, request.id);
            return false;
        }
        if let Some(entry) = self.entries.get(&request.id) {
            if entry.status.is_active() || entry.status == TaskStatus::Completed {
                log::debug!("重复的片段: {}", request.id);
                return false;
            }
        }
        let id = request.id.clone();
        self.entries.insert(id.clone(), QueueEntry::new(request, course));
        self.backlog.push_back(id);
        self.drained = false;
        true
    }

    /// 空闲时取出队首片段并派发
    fn process_queue(&mut self, ctx: &mut Context<Self>) {
        if self.dispatched.is_some() || self.halted.is_some() {
            return;
        }

        let (request, course) = loop {
            let Some(id) = self.backlog.pop_front() else {
                self.notify_if_drained();
                return;
            };
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.status = TaskStatus::Dispatched;
                break (entry.request.clone(), entry.course.clone());
            }
        };

        let id = request.id.clone();
        self.dispatched = Some(id.clone());
        log::info!("派发 {} ({}), 剩余 {}", id, request.target.title, self.backlog.len());
        self.hub.publish(QueueEvent::Dispatched {
            id: id.clone(),
            title: request.target.title.clone(),
            remaining: self.backlog.len(),
        });

        let companions = if self.companions_done.insert(course.id.clone()) {
            Some(self.companions.clone())
        } else {
            None
        };
        let executor = self.executor.clone();
        let fut = async move {
            if let Some(companions) = companions {
                match companions.write(&course).await {
                    Ok(written) if !written.is_empty() => {
                        log::info!("已写入 {} 个课程附属文件: {}", written.len(), course.title)
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("课程附属文件写入失败 {}: {}", course.title, e),
                }
            }
            executor.execute(&request).await
        };

        ctx.spawn(
            fut.into_actor(self)
                .map(move |result, actor, ctx| actor.finish(id, result, ctx)),
        );
    }

    /// 处理一次传输的结果，然后继续派发
    fn finish(&mut self, id: String, result: Result<FinalFile, DownloadError>, ctx: &mut Context<Self>) {
        self.dispatched = None;
        let Some(entry) = self.entries.get_mut(&id) else {
            self.process_queue(ctx);
            return;
        };
        let title = entry.request.target.title.clone();

        match result {
            Ok(file) => {
                log::info!("完成 {} -> {} ({} 字节)", id, file.path.display(), file.bytes);
                entry.status = TaskStatus::Completed;
                self.hub.publish(QueueEvent::Completed { id, path: file.path, bytes: file.bytes });
            }
            Err(err) if err.is_fatal() => {
                let cause = err.to_string();
                log::error!("{} 失败，队列停止: {}", id, cause);
                entry.status = TaskStatus::Failed(cause.clone());
                self.hub.publish(QueueEvent::Failed { id, title, cause: cause.clone() });
                self.hub.publish(QueueEvent::Halted { cause: cause.clone() });
                self.halted = Some(cause);
                return;
            }
            Err(err) => match self.strategy.decide(&err, entry.retry.retry_count) {
                RetryDecision::Retry(delay) => {
                    entry.retry.record_retry(&err, delay);
                    entry.status = TaskStatus::Retrying;
                    log::warn!(
                        "{} 第 {} 次重试，{:?} 后重新排队: {}",
                        id, entry.retry.retry_count, delay, err
                    );
                    self.hub.publish(QueueEvent::Retrying {
                        id: id.clone(),
                        title,
                        delay_ms: delay.as_millis() as u64,
                        cause: err.to_string(),
                    });
                    ctx.run_later(delay, move |actor, ctx| actor.requeue(id, ctx));
                }
                RetryDecision::GiveUp => {
                    let cause = if err.is_retryable() {
                        format!("超过最大重试次数 ({}): {}", self.strategy.max_retries, err)
                    } else {
                        err.to_string()
                    };
                    let stats = entry.retry.get_retry_stats();
                    log::error!(
                        "{} 失败 (重试 {} 次, 累计等待 {:?}): {}",
                        id, stats.total_retries, stats.total_retry_time, cause
                    );
                    entry.status = TaskStatus::Failed(cause.clone());
                    self.hub.publish(QueueEvent::Failed { id, title, cause });
                }
            },
        }
        self.process_queue(ctx);
    }

    /// 冷却结束，回到队尾
    fn requeue(&mut self, id: String, ctx: &mut Context<Self>) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if entry.status == TaskStatus::Retrying {
                entry.status = TaskStatus::Queued;
                self.backlog.push_back(id);
            }
        }
        self.process_queue(ctx);
    }

    fn notify_if_drained(&mut self) {
        if self.drained || self.dispatched.is_some() || !self.backlog.is_empty() {
            return;
        }
        if self.entries.values().any(|e| e.status == TaskStatus::Retrying) {
            return;
        }
        self.drained = true;
        log::info!("下载队列已清空");
        self.hub.publish(QueueEvent::Drained);
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            queued: self.backlog.iter().cloned().collect(),
            dispatched: self.dispatched.clone(),
            statuses: self
                .entries
                .iter()
                .map(|(id, e)| (id.clone(), e.status.clone()))
                .collect(),
            halted: self.halted.is_some(),
        }
    }
}

impl Handler<Enqueue> for DownloadQueueActor {
    type Result = bool;
    fn handle(&mut self, msg: Enqueue, ctx: &mut Self::Context) -> Self::Result {
        let admitted = self.admit(msg.request, msg.course);
        self.process_queue(ctx);
        admitted
    }
}

impl Handler<EnqueueCourse> for DownloadQueueActor {
    type Result = usize;
    fn handle(&mut self, msg: EnqueueCourse, ctx: &mut Self::Context) -> Self::Result {
        let requests = match msg.module {
            Some(ordinal) => msg.course.module_requests(ordinal),
            None => msg.course.download_requests(),
        };
        if requests.is_empty() {
            log::warn!("课程 {} 没有可下载的片段", msg.course.info.title);
        }
        let info = Arc::new(msg.course.info.clone());
        let mut added = 0;
        for request in requests {
            if self.admit(request, info.clone()) {
                added += 1;
            }
        }
        self.process_queue(ctx);
        added
    }
}

impl Handler<QueryQueue> for DownloadQueueActor {
    type Result = MessageResult<QueryQueue>;
    fn handle(&mut self, _msg: QueryQueue, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.snapshot())
    }
}

impl Handler<QueryTaskStatus> for DownloadQueueActor {
    type Result = Option<TaskStatus>;
    fn handle(&mut self, msg: QueryTaskStatus, _ctx: &mut Self::Context) -> Self::Result {
        self.entries.get(&msg.id).map(|e| e.status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use crate::core::course::{Clip, Course, Module, TargetDescriptor};
    use crate::core::testing::{executor_for, Script, ScriptedCredentials, ScriptedSource};

    fn fast_strategy() -> RetryStrategy {
        RetryStrategy {
            max_retries: 5,
            throttle_cooldown: Duration::from_millis(30),
            transient_delay_min: Duration::from_millis(5),
            transient_delay_max: Duration::from_millis(10),
        }
    }

    fn start_queue(
        source: ScriptedSource,
        credentials: ScriptedCredentials,
        base: &Path,
        hub: EventHub,
    ) -> Addr<DownloadQueueActor> {
        let executor = Rc::new(executor_for(source, credentials, base, hub.clone()));
        let companions = Rc::new(CompanionWriter::new(
            executor.placer().clone(),
            executor.source(),
            executor.credentials(),
        ));
        DownloadQueueActor::new(executor, companions, fast_strategy(), hub).start()
    }

    fn course_info() -> Arc<CourseInfo> {
        Arc::new(CourseInfo {
            id: "intro-x".into(),
            title: "Intro to X".into(),
            ..Default::default()
        })
    }

    fn request(n: u32) -> DownloadRequest {
        DownloadRequest {
            id: format!("clip-{}", n),
            source: format!("https://cdn.test/{}-{{quality}}.mp4", n),
            target: TargetDescriptor {
                course_title: "Intro to X".into(),
                module_title: "Basics".into(),
                module_ordinal: 1,
                clip_ordinal: n,
                title: format!("Clip {}", n),
                duration_seconds: 0,
            },
            wide_screen: false,
        }
    }

    fn url(n: u32) -> String {
        format!("https://cdn.test/{}-1024x768.mp4", n)
    }

    async fn enqueue(queue: &Addr<DownloadQueueActor>, n: u32) -> bool {
        queue
            .send(Enqueue { request: request(n), course: course_info() })
            .await
            .unwrap()
    }

    /// 一次性放入邮箱，保证在第一个传输结束前全部入队
    async fn enqueue_all(queue: &Addr<DownloadQueueActor>, ids: &[u32]) -> Vec<bool> {
        let pending: Vec<_> = ids
            .iter()
            .map(|&n| queue.send(Enqueue { request: request(n), course: course_info() }))
            .collect();
        let mut admitted = Vec::new();
        for p in pending {
            admitted.push(p.await.unwrap());
        }
        admitted
    }

    /// 收集事件直到 Drained 或 Halted
    async fn collect(rx: &mut broadcast::Receiver<QueueEvent>) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for queue event")
                .expect("event channel closed");
            let last = matches!(event, QueueEvent::Drained | QueueEvent::Halted { .. });
            events.push(event);
            if last {
                return events;
            }
        }
    }

    fn label(event: &QueueEvent) -> String {
        match event {
            QueueEvent::Dispatched { id, .. } => format!("dispatched {}", id),
            QueueEvent::Completed { id, .. } => format!("completed {}", id),
            QueueEvent::Retrying { id, .. } => format!("retrying {}", id),
            QueueEvent::Failed { id, .. } => format!("failed {}", id),
            QueueEvent::Drained => "drained".to_string(),
            QueueEvent::Halted { .. } => "halted".to_string(),
        }
    }

    #[actix_rt::test]
    async fn test_fifo_single_flight() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new();
        for n in 1..=3 {
            source.push(&url(n), Script::body(vec![n as u8; 1024]).slow(Duration::from_millis(50)));
        }
        let hub = EventHub::new(64);
        let mut rx = hub.subscribe_queue();
        let queue = start_queue(source, ScriptedCredentials::ok(), dir.path(), hub);

        assert_eq!(enqueue_all(&queue, &[1, 2, 3]).await, vec![true, true, true]);
        let snapshot = queue.send(QueryQueue).await.unwrap();
        assert_eq!(snapshot.dispatched.as_deref(), Some("clip-1"));
        assert_eq!(snapshot.queued, vec!["clip-2".to_string(), "clip-3".to_string()]);

        let labels: Vec<String> = collect(&mut rx).await.iter().map(label).collect();
        assert_eq!(
            labels,
            vec![
                "dispatched clip-1", "completed clip-1",
                "dispatched clip-2", "completed clip-2",
                "dispatched clip-3", "completed clip-3",
                "drained",
            ]
        );
    }

    #[actix_rt::test]
    async fn test_throttle_then_success() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new();
        source.push(&url(1), Script::Throttle);
        source.push(&url(1), Script::body(b"the real video".to_vec()));
        let hub = EventHub::new(64);
        let mut rx = hub.subscribe_queue();
        let queue = start_queue(source.clone(), ScriptedCredentials::ok(), dir.path(), hub);

        enqueue(&queue, 1).await;
        let events = collect(&mut rx).await;
        let labels: Vec<String> = events.iter().map(label).collect();
        assert_eq!(
            labels,
            vec!["dispatched clip-1", "retrying clip-1", "dispatched clip-1", "completed clip-1", "drained"]
        );
        assert!(matches!(events[1], QueueEvent::Retrying { delay_ms: 30, .. }));

        let QueueEvent::Completed { path, bytes, .. } = &events[3] else {
            panic!("expected completion");
        };
        assert_eq!(*bytes, 14);
        assert_eq!(std::fs::read(path).unwrap(), b"the real video");
        assert_eq!(source.opened().len(), 2);
        assert_eq!(
            queue.send(QueryTaskStatus { id: "clip-1".into() }).await.unwrap(),
            Some(TaskStatus::Completed)
        );
    }

    #[actix_rt::test]
    async fn test_authentication_failure_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = ScriptedCredentials::failing();
        let hub = EventHub::new(64);
        let mut rx = hub.subscribe_queue();
        let queue = start_queue(ScriptedSource::new(), credentials.clone(), dir.path(), hub);

        enqueue(&queue, 1).await;
        let labels: Vec<String> = collect(&mut rx).await.iter().map(label).collect();
        assert_eq!(labels, vec!["dispatched clip-1", "failed clip-1", "drained"]);
        assert_eq!(credentials.calls(), 1);
        assert!(matches!(
            queue.send(QueryTaskStatus { id: "clip-1".into() }).await.unwrap(),
            Some(TaskStatus::Failed(_))
        ));
    }

    #[actix_rt::test]
    async fn test_repeated_authentication_failure_never_retries() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = ScriptedCredentials::failing();
        let hub = EventHub::new(64);
        let mut rx = hub.subscribe_queue();
        let queue = start_queue(ScriptedSource::new(), credentials.clone(), dir.path(), hub);

        for attempt in 1..=2 {
            assert!(enqueue(&queue, 1).await);
            let labels: Vec<String> = collect(&mut rx).await.iter().map(label).collect();
            assert_eq!(labels, vec!["dispatched clip-1", "failed clip-1", "drained"]);
            assert_eq!(credentials.calls(), attempt);
        }

        actix_rt::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(credentials.calls(), 2);
    }

    #[actix_rt::test]
    async fn test_retry_cap_marks_failed() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new();
        let hub = EventHub::new(64);
        let mut rx = hub.subscribe_queue();
        let queue = start_queue(source.clone(), ScriptedCredentials::ok(), dir.path(), hub);

        enqueue(&queue, 1).await;
        let events = collect(&mut rx).await;
        let count = |name: &str| events.iter().filter(|e| label(e).starts_with(name)).count();
        assert_eq!(count("dispatched"), 6);
        assert_eq!(count("retrying"), 5);
        assert_eq!(count("failed"), 1);
        assert_eq!(source.opened().len(), 6);
        let Some(QueueEvent::Failed { cause, .. }) = events.iter().find(|e| matches!(e, QueueEvent::Failed { .. })) else {
            panic!("expected failure");
        };
        assert!(cause.contains("超过最大重试次数"));
    }

    #[actix_rt::test]
    async fn test_duplicate_enqueue_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new();
        source.push(&url(1), Script::body(vec![1u8; 2048]).slow(Duration::from_millis(20)));
        let hub = EventHub::new(64);
        let mut rx = hub.subscribe_queue();
        let queue = start_queue(source, ScriptedCredentials::ok(), dir.path(), hub);

        assert_eq!(enqueue_all(&queue, &[1, 1]).await, vec![true, false]);
        collect(&mut rx).await;
        assert!(!enqueue(&queue, 1).await);
    }

    #[actix_rt::test]
    async fn test_fatal_fault_halts_queue() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new();
        source.push(&url(1), Script::DiskFull);
        source.push(&url(2), Script::body(vec![2u8; 100]));
        let hub = EventHub::new(64);
        let mut rx = hub.subscribe_queue();
        let queue = start_queue(source.clone(), ScriptedCredentials::ok(), dir.path(), hub);

        enqueue_all(&queue, &[1, 2]).await;
        let labels: Vec<String> = collect(&mut rx).await.iter().map(label).collect();
        assert_eq!(labels, vec!["dispatched clip-1", "failed clip-1", "halted"]);

        let snapshot = queue.send(QueryQueue).await.unwrap();
        assert!(snapshot.halted);
        assert_eq!(snapshot.queued, vec!["clip-2".to_string()]);
        assert!(!enqueue(&queue, 3).await);
        assert_eq!(source.opened(), vec![url(1)]);
    }

    #[actix_rt::test]
    async fn test_enqueue_course_module_writes_companions_once() {
        let dir = tempfile::tempdir().unwrap();
        let clip = |name: &str, n: u32| Clip {
            name: name.into(),
            title: format!("Clip {}", n),
            locator: format!("https://cdn.test/{}-{{quality}}.mp4", n),
            duration_seconds: 0,
        };
        let course = Arc::new(Course {
            info: CourseInfo {
                id: "intro-x".into(),
                title: "Intro to X".into(),
                description: "All about X".into(),
                ..Default::default()
            },
            supports_wide_screen_video_formats: false,
            modules: vec![
                Module { title: "Setup".into(), clips: vec![clip("a", 1)] },
                Module { title: "Basics".into(), clips: vec![clip("b", 2), clip("c", 3)] },
            ],
        });
        let source = ScriptedSource::new();
        source.push(&url(2), Script::body(vec![2u8; 10]));
        source.push(&url(3), Script::body(vec![3u8; 10]));
        let hub = EventHub::new(64);
        let mut rx = hub.subscribe_queue();
        let queue = start_queue(source, ScriptedCredentials::ok(), dir.path(), hub);

        let added = queue.send(EnqueueCourse { course: course.clone(), module: Some(2) }).await.unwrap();
        assert_eq!(added, 2);
        let labels: Vec<String> = collect(&mut rx).await.iter().map(label).collect();
        assert_eq!(labels.iter().filter(|l| l.starts_with("completed")).count(), 2);

        let course_dir = dir.path().join("Intro to X");
        assert_eq!(std::fs::read_to_string(course_dir.join("description.txt")).unwrap(), "All about X");
        assert!(course_dir.join("02 - Basics").join("02 - Clip 3.mp4").exists());
        assert_eq!(queue.send(EnqueueCourse { course, module: Some(9) }).await.unwrap(), 0);
    }
}
