//! CLI: 命令行接口和参数解析模块
//!
//! ## 支持的命令
//!
//! - 下载课程：`coursedown <manifest.json>...`
//! - 只下载一个章节：`coursedown -m 2 <manifest.json>`
//! - 编辑配置：`coursedown -e`
//! - 指定配置：`coursedown -c config.conf <manifest.json>`
//! - 全局限速：`coursedown -l 1024 <manifest.json>`
//!
//! ## 平台支持
//!
//! - Windows: `%APPDATA%/coursedown/coursedown.conf`
//! - macOS: `~/Library/Application Support/coursedown/coursedown.conf`
//! - Linux: `~/.config/coursedown/coursedown.conf`

use clap::Parser;
use std::env;
use std::path::Path;
use crate::config::Config;
use crate::core::error::DownloadError;

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/coursedown/coursedown.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/coursedown/coursedown.conf", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/coursedown/coursedown.conf", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 $EDITOR，其次 xdg-open，最后 nano
        let editor = env::var("EDITOR").unwrap_or_else(|_| "xdg-open".to_string());
        if std::process::Command::new(editor).arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

/// CourseDown 命令行参数
///
/// 示例用法：
///   coursedown rust-basics.json
///   coursedown -e  # 编辑配置文件
///   coursedown -m 3 --cookie "session=..." rust-basics.json
#[derive(Parser, Debug, Clone)]
#[command(
    name = "coursedown",
    author = "panzhifu",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("VERGEN_BUILD_TIMESTAMP"), ")"),
    about = "一个用 Rust 编写的课程视频限速排队下载器",
    long_about = "按课程清单逐个下载视频片段：同一时间只有一个传输，速度按视频时长限制，\
                  被限流或网络中断时自动冷却重试。\n\n示例：\n  coursedown rust-basics.json\n  \
                  coursedown -m 2 rust-basics.json\n  coursedown -e\n"
)]
pub struct Args {
    /// 课程清单（JSON）
    #[arg(required = false, help = "课程清单文件（JSON），可以同时指定多个。")]
    pub manifests: Vec<String>,

    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    /// 编辑配置文件（-e 或 --edit）
    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    /// 下载根目录
    #[arg(long, short = 'd', help = "下载根目录，覆盖配置文件中的设置。")]
    pub download_dir: Option<String>,

    /// 全局速度上限（KB/s）
    #[arg(long, short = 'l', help = "全局速度上限（KB/s），0 表示只按视频时长限速。")]
    pub speed_limit_kb: Option<u64>,

    /// 只下载指定章节
    #[arg(long, short = 'm', value_name = "ORDINAL", help = "只下载指定章节（从 1 开始）。")]
    pub module: Option<u32>,

    /// 登录凭据
    #[arg(long, value_name = "TOKEN", help = "登录凭据（Cookie 原文），覆盖配置文件中的 auth_cookie。")]
    pub cookie: Option<String>,

    /// 以 JSON 行输出事件
    #[arg(long, help = "以 JSON 行的形式把队列事件输出到标准输出，不显示进度条。")]
    pub json: bool,
}

impl Args {
    /// 解析命令行参数并加载配置
    pub fn parse_args() -> Result<(Self, Config), DownloadError> {
        let args = Args::parse();

        if args.edit_config {
            if !Path::new(&args.config).exists() {
                Config::default().save_with_tutorial(&args.config)?;
            }
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        let config = args.load_config()?;
        Ok((args, config))
    }

    /// 读取（必要时创建）配置文件，合并命令行参数并校验
    pub fn load_config(&self) -> Result<Config, DownloadError> {
        let mut config = Config::load(&self.config)?;
        config.merge_from_args(self);
        config
            .validate()
            .map_err(|e| DownloadError::config(format!("配置无效: {}", e)))?;
        Ok(config)
    }

    /// 校验并返回课程清单路径
    pub fn get_manifests(&self) -> Result<Vec<String>, DownloadError> {
        if self.manifests.is_empty() {
            return Err(DownloadError::config("未提供任何课程清单"));
        }
        for manifest in &self.manifests {
            if !Path::new(manifest).is_file() {
                return Err(DownloadError::metadata(format!("课程清单不存在: {}", manifest)));
            }
        }
        if self.module == Some(0) {
            return Err(DownloadError::config("章节序号从 1 开始"));
        }
        Ok(self.manifests.clone())
    }
}
