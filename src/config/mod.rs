use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use crate::core::error::DownloadError;
use crate::core::task::download::TransferSettings;
use crate::core::task::retry::RetryStrategy;

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 下载根目录
    pub download_dir: String,
    /// 全局速度上限（KB/s），0 表示只按视频时长限速
    pub speed_limit_kb: u64,
    /// 相对实时播放码率的倍数
    pub speed_multiplier: u64,
    /// 读取块大小（字节），同时决定进度上报粒度
    pub chunk_size: usize,
    /// 网络超时时间（秒）
    pub timeout: u64,
    /// User-Agent
    pub user_agent: String,
    /// 单个片段的最大重试次数
    pub max_retries: u32,
    /// 被限流后的冷却时间（秒）
    pub throttle_cooldown: u64,
    /// 其它临时故障的重试延迟区间（秒）
    pub retry_delay_min: u64,
    pub retry_delay_max: u64,
    /// 宽屏课程使用的分辨率
    pub wide_quality: String,
    /// 普通课程使用的分辨率
    pub standard_quality: String,
    /// 登录凭据（Cookie 原文），为空表示匿名
    pub auth_cookie: String,
    /// 队列事件日志
    pub log_file: String,
    /// 日志文件最大大小（字节）
    pub log_max_size: u64,
    /// 事件通道容量
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: "./downloads".to_string(),
            speed_limit_kb: 0, // 默认不设全局上限
            speed_multiplier: 2,
            chunk_size: 1024,
            timeout: 30,
            user_agent: concat!("CourseDown/", env!("CARGO_PKG_VERSION")).to_string(),
            max_retries: 5,
            throttle_cooldown: 30,
            retry_delay_min: 20,
            retry_delay_max: 30,
            wide_quality: "1280x720".to_string(),
            standard_quality: "1024x768".to_string(),
            auth_cookie: String::new(),
            log_file: "logs/coursedown.log".to_string(),
            log_max_size: 10 * 1024 * 1024,
            event_capacity: 256,
        }
    }
}

impl Config {
    /// 加载配置文件，不存在时写入默认配置
    pub fn load(path: &str) -> Result<Self, DownloadError> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| DownloadError::config(format!("无法读取配置文件 {}: {}", path, e)))?;
            match toml::from_str(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    // 格式错误时不覆盖用户文件
                    log::warn!("配置文件格式错误: {}，将使用默认配置", e);
                    Ok(Config::default())
                }
            }
        } else {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            Ok(config)
        }
    }

    /// 保存带教程的配置文件（唯一写入方法）
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), DownloadError> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DownloadError::config(format!("无法创建配置目录 {}: {}", parent.display(), e))
            })?;
        }
        let config_content = toml::to_string_pretty(self)
            .map_err(|e| DownloadError::config(format!("无法序列化配置: {}", e)))?;
        let full_content = format!("{}\n{}", Config::generate_tutorial_content(), config_content);
        fs::write(path, full_content)
            .map_err(|e| DownloadError::config(format!("无法写入配置文件 {}: {}", path, e)))?;
        Ok(())
    }

    fn generate_tutorial_content() -> &'static str {
        r#"# CourseDown 配置文件
# ====================
#
# TOML 格式。命令行参数会覆盖这里的设置，优先级：命令行 > 配置文件 > 默认值
#
# 配置文件位置：
# - Windows: %APPDATA%/coursedown/coursedown.conf
# - macOS: ~/Library/Application Support/coursedown/coursedown.conf
# - Linux: ~/.config/coursedown/coursedown.conf
#
# 使用示例：
#   coursedown rust-basics.json                  # 下载整门课程
#   coursedown -m 2 rust-basics.json             # 只下载第 2 章
#   coursedown -l 512 rust-basics.json           # 全局限速 512KB/s
#   coursedown --cookie "session=..." a.json b.json
#   coursedown -e                                # 编辑配置文件
#
# ==================== 限速 ====================
#
# 每个片段的速度上限 = ceil(文件大小 / 视频时长) * speed_multiplier，
# 即按实时播放码率的若干倍下载。speed_limit_kb 不为 0 时再取两者较小值。
# 文件大小或时长未知时，只有 speed_limit_kb 生效。
#
# ==================== 重试 ====================
#
# 被服务器限流（HTTP 429）后等待 throttle_cooldown 秒；
# 网络中断等临时故障随机等待 retry_delay_min 到 retry_delay_max 秒；
# 认证失败不重试。每个片段最多重试 max_retries 次。
#
# ==================== 故障排除 ====================
#
# 问题：频繁出现 429
# 解决：调低 speed_multiplier 或设置 speed_limit_kb
#
# 问题：所有片段都提示无权访问
# 解决：更新 auth_cookie 或使用 --cookie
#
# 问题：队列停止并提示磁盘已满或权限不足
# 解决：清理磁盘或更换 download_dir 后重新运行，已完成的片段会被覆盖重下
#
# ==================== 配置项 ====================
"#
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.download_dir.trim().is_empty() {
            return Err(DownloadError::config("下载目录不能为空"));
        }
        if self.speed_multiplier == 0 {
            return Err(DownloadError::config("速度倍数必须大于0"));
        }
        if self.chunk_size == 0 {
            return Err(DownloadError::config("块大小必须大于0"));
        }
        if self.timeout == 0 {
            return Err(DownloadError::config("超时时间必须大于0"));
        }
        if self.retry_delay_min > self.retry_delay_max {
            return Err(DownloadError::config("retry_delay_min 不能大于 retry_delay_max"));
        }
        if self.event_capacity == 0 {
            return Err(DownloadError::config("事件通道容量必须大于0"));
        }
        for quality in [&self.wide_quality, &self.standard_quality] {
            if quality.trim().is_empty() {
                return Err(DownloadError::config("分辨率不能为空"));
            }
        }
        Ok(())
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(speed_limit) = args.speed_limit_kb {
            self.speed_limit_kb = speed_limit;
        }
        if let Some(dir) = &args.download_dir {
            self.download_dir = dir.clone();
        }
        if let Some(cookie) = &args.cookie {
            self.auth_cookie = cookie.clone();
        }
    }

    pub fn retry_strategy(&self) -> RetryStrategy {
        RetryStrategy {
            max_retries: self.max_retries,
            throttle_cooldown: Duration::from_secs(self.throttle_cooldown),
            transient_delay_min: Duration::from_secs(self.retry_delay_min),
            transient_delay_max: Duration::from_secs(self.retry_delay_max),
        }
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            chunk_size: self.chunk_size,
            speed_multiplier: self.speed_multiplier,
            speed_cap: self.speed_limit_kb.saturating_mul(1024),
        }
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 下载目录: {}\n\
            - 全局限速: {}\n\
            - 速度倍数: {}x\n\
            - 超时时间: {} 秒\n\
            - 最大重试: {} 次 (限流冷却 {} 秒, 其它 {}-{} 秒)\n\
            - 分辨率: {} / {}\n\
            - 凭据: {}",
            self.download_dir,
            if self.speed_limit_kb == 0 { "不限速".to_string() } else { format!("{} KB/s", self.speed_limit_kb) },
            self.speed_multiplier,
            self.timeout,
            self.max_retries,
            self.throttle_cooldown,
            self.retry_delay_min,
            self.retry_delay_max,
            self.wide_quality,
            self.standard_quality,
            if self.auth_cookie.trim().is_empty() { "匿名" } else { "已设置" }
        )
    }
}
