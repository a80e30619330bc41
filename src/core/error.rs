use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// ENOSPC 在 Linux 与 macOS 上的取值相同
const NO_SPACE_LEFT: i32 = 28;

/// 下载流水线中唯一的错误类型。
///
/// 底层的网络、文件错误在传输边界处被归类成下面几种，
/// 队列只会收到已经归类的错误。
#[derive(Error, Debug)]
pub enum DownloadError {
    /// 远端返回 429，需要冷却后重试
    #[error("请求过于频繁: {0}")]
    Throttled(Cow<'static, str>),

    /// 凭据无效或无权访问，不再重试
    #[error("认证失败: {0}")]
    Authentication(Cow<'static, str>),

    /// 网络或数据流故障
    #[error("网络错误: {0}")]
    Transport(Cow<'static, str>),

    /// 暂存或落盘阶段的文件系统故障
    #[error("文件操作失败 {}: {source}", path.display())]
    Placement {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("无效的URL: {0}")]
    InvalidUrl(Cow<'static, str>),

    #[error("课程元数据错误: {0}")]
    Metadata(Cow<'static, str>),

    #[error("配置错误: {0}")]
    Config(Cow<'static, str>),
}

impl DownloadError {
    pub fn throttled(msg: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::Throttled(msg.into())
    }

    pub fn authentication(msg: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::Authentication(msg.into())
    }

    pub fn transport(msg: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::Transport(msg.into())
    }

    pub fn invalid_url(msg: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::InvalidUrl(msg.into())
    }

    pub fn metadata(msg: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::Metadata(msg.into())
    }

    pub fn config(msg: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::Config(msg.into())
    }

    pub fn placement(path: impl AsRef<Path>, source: io::Error) -> Self {
        DownloadError::Placement {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, DownloadError::Throttled(_))
    }

    /// 是否允许排队重试
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Throttled(_) | DownloadError::Transport(_) => true,
            DownloadError::Placement { .. } => !self.is_fatal(),
            _ => false,
        }
    }

    /// 本地磁盘已满或无写权限时，整个队列都无法继续
    pub fn is_fatal(&self) -> bool {
        match self {
            DownloadError::Placement { source, .. } => {
                source.kind() == io::ErrorKind::PermissionDenied
                    || source.raw_os_error() == Some(NO_SPACE_LEFT)
            }
            _ => false,
        }
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;
