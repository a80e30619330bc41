mod progress;

use std::fmt;
use std::time::Duration;
use crossterm::style::Stylize;
pub use progress::ProgressManager;

use crate::core::events::QueueEvent;

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message.red());
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message.yellow());
}

/// 队列事件的单行提示
pub fn event_notice(event: &QueueEvent) -> String {
    match event {
        QueueEvent::Dispatched { title, remaining, .. } => {
            format!("{} {} (剩余 {})", "↓".blue(), title, remaining)
        }
        QueueEvent::Completed { path, bytes, .. } => {
            format!("{} {} ({})", "✓".green(), path.display(), format_size(*bytes))
        }
        QueueEvent::Retrying { title, delay_ms, cause, .. } => format!(
            "{} {}: {}，{:.0} 秒后重试",
            "⚠".yellow(),
            title,
            cause,
            Duration::from_millis(*delay_ms).as_secs_f64()
        ),
        QueueEvent::Failed { title, cause, .. } => format!("{} {}: {}", "✗".red(), title, cause.as_str().red()),
        QueueEvent::Drained => format!("{} 全部完成", "✓".green()),
        QueueEvent::Halted { cause } => format!("{} 队列已停止: {}", "✗".red(), cause.as_str().red()),
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DownloadSummary {
    pub total_files: usize,
    pub total_size: u64,
    pub elapsed_time: Duration,
    pub success_count: usize,
    pub failed_count: usize,
    pub retry_count: usize,
    pub halted: bool,
}

impl DownloadSummary {
    pub fn new(total_files: usize) -> Self {
        Self { total_files, ..Default::default() }
    }

    pub fn record(&mut self, event: &QueueEvent) {
        match event {
            QueueEvent::Completed { bytes, .. } => {
                self.success_count += 1;
                self.total_size += bytes;
            }
            QueueEvent::Retrying { .. } => self.retry_count += 1,
            QueueEvent::Failed { .. } => self.failed_count += 1,
            QueueEvent::Halted { .. } => self.halted = true,
            QueueEvent::Dispatched { .. } | QueueEvent::Drained => {}
        }
    }

    pub fn all_succeeded(&self) -> bool {
        !self.halted && self.failed_count == 0 && self.success_count == self.total_files
    }
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n下载摘要:")?;
        writeln!(f, "总文件数: {}", self.total_files)?;
        writeln!(f, "总大小: {}", format_size(self.total_size))?;
        writeln!(f, "耗时: {:.2}秒", self.elapsed_time.as_secs_f64())?;
        writeln!(f, "成功: {}", self.success_count)?;
        writeln!(f, "失败: {}", self.failed_count)?;
        writeln!(f, "重试: {}", self.retry_count)?;
        if self.halted {
            writeln!(f, "队列因磁盘错误提前停止")?;
        }
        Ok(())
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
