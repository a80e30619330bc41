use std::collections::{HashMap, HashSet};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::core::events::{QueueEvent, TransferProgress};

const BAR_TEMPLATE: &str = "{msg:40!} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec}";

// 结构体：ProgressManager
// 每个片段一个进度条，按片段标识索引
pub struct ProgressManager {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    // 已经收到结束事件的片段，重新派发前丢弃迟到的进度
    settled: HashSet<String>,
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressManager {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// 不绘制任何内容（JSON 输出模式和测试）
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        ProgressManager {
            multi: MultiProgress::with_draw_target(target),
            bars: HashMap::new(),
            settled: HashSet::new(),
        }
    }

    fn bar(&mut self, id: &str, title: &str) -> &ProgressBar {
        let multi = &self.multi;
        self.bars.entry(id.to_string()).or_insert_with(|| {
            let style = ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");
            let pb = multi.add(ProgressBar::new(0));
            pb.set_style(style);
            pb.set_message(title.to_string());
            pb
        })
    }

    /// 应用一条进度事件，被丢弃时返回 false
    pub fn apply(&mut self, progress: &TransferProgress) -> bool {
        if self.settled.contains(&progress.id) {
            return false;
        }
        let pb = self.bar(&progress.id, &progress.file_name);
        if progress.total_bytes > 0 {
            pb.set_length(progress.total_bytes);
        }
        pb.set_position(progress.bytes_received);
        if !progress.is_downloading {
            self.settled.insert(progress.id.clone());
        }
        true
    }

    /// 根据队列事件更新进度条状态
    pub fn on_queue_event(&mut self, event: &QueueEvent) {
        match event {
            QueueEvent::Dispatched { id, title, .. } => {
                self.settled.remove(id);
                let pb = self.bar(id, title);
                pb.reset();
                pb.set_message(title.clone());
            }
            QueueEvent::Completed { id, .. } => {
                self.settled.insert(id.clone());
                if let Some(pb) = self.bars.remove(id) {
                    pb.finish();
                }
            }
            QueueEvent::Retrying { id, delay_ms, .. } => {
                self.settled.insert(id.clone());
                if let Some(pb) = self.bars.get(id) {
                    pb.set_message(format!("等待 {} 秒后重试", delay_ms / 1000));
                }
            }
            QueueEvent::Failed { id, .. } => {
                self.settled.insert(id.clone());
                if let Some(pb) = self.bars.remove(id) {
                    pb.abandon_with_message("失败");
                }
            }
            QueueEvent::Drained | QueueEvent::Halted { .. } => self.finish(),
        }
    }

    pub fn position(&self, id: &str) -> Option<u64> {
        self.bars.get(id).map(|pb| pb.position())
    }

    pub fn finish(&mut self) {
        for (_, pb) in self.bars.drain() {
            pb.finish_and_clear();
        }
        let _ = self.multi.clear();
    }

    /// 在进度条上方输出一行，避免画面错乱
    pub fn println(&self, line: &str) {
        if self.multi.println(line).is_err() {
            println!("{}", line);
        }
    }
}
