use chrono::Local; // 用于获取本地时间
use log::LevelFilter; // 用于设置日志级别
use std::io::{Write, BufWriter};
use std::fs::{File, OpenOptions};
use std::path::Path;
use actix::prelude::*;

use crate::core::events::QueueEvent;

/// 日志消息
pub struct LogMsg {
    pub level: LevelFilter,
    pub message: String,
}
impl Message for LogMsg { type Result = (); }

/// 记录一条队列事件
pub struct JournalEvent(pub QueueEvent);
impl Message for JournalEvent { type Result = (); }

/// 立即刷新缓冲区
pub struct Flush;
impl Message for Flush { type Result = (); }

/// 日志Actor，作为操作员查看的队列日志
pub struct LoggerActor {
    writer: BufWriter<File>,
    level: LevelFilter,
    file_path: String,
    max_size: u64, // 最大文件大小 (bytes)
    current_size: u64,
}

impl LoggerActor {
    /// 创建新的日志Actor
    pub fn new(file_path: &str, level: LevelFilter, max_size: u64) -> Result<Self, std::io::Error> {
        if let Some(parent) = Path::new(file_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            writer: BufWriter::new(file),
            level,
            file_path: file_path.to_string(),
            max_size,
            current_size,
        })
    }

    /// 检查并执行日志轮转
    fn check_rotation(&mut self) -> Result<(), std::io::Error> {
        if self.current_size > self.max_size {
            self.writer.flush()?;

            let backup_path = format!("{}.backup", self.file_path);
            if Path::new(&backup_path).exists() {
                std::fs::remove_file(&backup_path)?;
            }
            std::fs::rename(&self.file_path, &backup_path)?;

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)?;

            self.writer = BufWriter::new(file);
            self.current_size = 0;
        }
        Ok(())
    }

    /// 写入日志并处理错误
    fn write_log(&mut self, level: LevelFilter, message: &str) -> Result<(), std::io::Error> {
        if level <= self.level {
            let log_entry = format!(
                "{} [{}] - {}\n",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                level,
                message
            );

            self.check_rotation()?;

            self.writer.write_all(log_entry.as_bytes())?;
            self.current_size += log_entry.len() as u64;

            // 定期刷新缓冲区
            if self.current_size % 1024 < log_entry.len() as u64 {
                self.writer.flush()?;
            }
        }
        Ok(())
    }
}

/// 队列事件对应的日志级别和文本
pub fn describe_event(event: &QueueEvent) -> (LevelFilter, String) {
    match event {
        QueueEvent::Dispatched { id, title, remaining } => {
            (LevelFilter::Info, format!("开始 {} ({})，队列剩余 {}", title, id, remaining))
        }
        QueueEvent::Completed { id, path, bytes } => {
            (LevelFilter::Info, format!("完成 {} -> {} ({} 字节)", id, path.display(), bytes))
        }
        QueueEvent::Retrying { id, title, delay_ms, cause } => (
            LevelFilter::Warn,
            format!("{} ({}) 将在 {:.1} 秒后重试: {}", title, id, *delay_ms as f64 / 1000.0, cause),
        ),
        QueueEvent::Failed { id, title, cause } => {
            (LevelFilter::Error, format!("{} ({}) 下载失败: {}", title, id, cause))
        }
        QueueEvent::Drained => (LevelFilter::Info, "队列已全部完成".to_string()),
        QueueEvent::Halted { cause } => (LevelFilter::Error, format!("队列已停止: {}", cause)),
    }
}

impl Actor for LoggerActor {
    type Context = Context<Self>;

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let _ = self.writer.flush();
    }
}

impl Handler<LogMsg> for LoggerActor {
    type Result = ();
    fn handle(&mut self, msg: LogMsg, _ctx: &mut Self::Context) {
        if let Err(e) = self.write_log(msg.level, &msg.message) {
            eprintln!("日志写入失败: {}", e);
        }
    }
}

impl Handler<JournalEvent> for LoggerActor {
    type Result = ();
    fn handle(&mut self, msg: JournalEvent, _ctx: &mut Self::Context) {
        let (level, message) = describe_event(&msg.0);
        if let Err(e) = self.write_log(level, &message) {
            eprintln!("日志写入失败: {}", e);
        }
    }
}

impl Handler<Flush> for LoggerActor {
    type Result = ();
    fn handle(&mut self, _msg: Flush, _ctx: &mut Self::Context) {
        if let Err(e) = self.writer.flush() {
            eprintln!("日志刷新失败: {}", e);
        }
    }
}

// 便捷的日志方法 - 为Addr<LoggerActor>提供扩展方法
pub trait LoggerExt {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
    fn journal(&self, event: &QueueEvent);
}

impl LoggerExt for Addr<LoggerActor> {
    fn info(&self, message: &str) {
        self.do_send(LogMsg {
            level: LevelFilter::Info,
            message: message.to_string(),
        });
    }

    fn error(&self, message: &str) {
        self.do_send(LogMsg {
            level: LevelFilter::Error,
            message: message.to_string(),
        });
    }

    fn journal(&self, event: &QueueEvent) {
        self.do_send(JournalEvent(event.clone()));
    }
}
