//! 落盘路径计算与暂存文件提升
//!
//! 目录结构：`<base>/<课程>/<NN - 章节>/<NN - 片段>.mp4`，
//! 暂存文件与最终文件同目录，文件名带 `raw-` 前缀。

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use regex::Regex;

use crate::core::course::TargetDescriptor;
use crate::core::error::DownloadError;

pub const STAGED_PREFIX: &str = "raw-";
pub const VIDEO_EXTENSION: &str = "mp4";

fn illegal_chars() -> &'static Regex {
    static ILLEGAL: OnceLock<Regex> = OnceLock::new();
    ILLEGAL.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("valid regex"))
}

/// 去掉文件系统不允许的字符以及结尾的点和空格
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = illegal_chars().replace_all(name, "");
    let trimmed = cleaned.trim().trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 单个片段的落盘位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub directory: PathBuf,
    pub file_name: String,
}

impl Placement {
    pub fn final_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    pub fn staged_path(&self) -> PathBuf {
        self.directory.join(format!("{}{}", STAGED_PREFIX, self.file_name))
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactPlacer {
    base_dir: PathBuf,
}

impl ArtifactPlacer {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn course_dir(&self, course_title: &str) -> PathBuf {
        self.base_dir.join(sanitize_file_name(course_title))
    }

    pub fn module_dir(&self, course_title: &str, module_ordinal: u32, module_title: &str) -> PathBuf {
        self.course_dir(course_title)
            .join(sanitize_file_name(&format!("{:02} - {}", module_ordinal, module_title)))
    }

    pub fn clip_file_name(&self, clip_ordinal: u32, clip_title: &str) -> String {
        sanitize_file_name(&format!("{:02} - {}.{}", clip_ordinal, clip_title, VIDEO_EXTENSION))
    }

    pub fn layout(&self, target: &TargetDescriptor) -> Placement {
        Placement {
            directory: self.module_dir(&target.course_title, target.module_ordinal, &target.module_title),
            file_name: self.clip_file_name(target.clip_ordinal, &target.title),
        }
    }

    /// 创建目录，已存在时不报错
    pub async fn prepare(&self, placement: &Placement) -> Result<(), DownloadError> {
        tokio::fs::create_dir_all(&placement.directory)
            .await
            .map_err(|e| DownloadError::placement(&placement.directory, e))
    }

    /// 用暂存文件覆盖最终文件：先删除已有文件，再移动
    pub async fn place(&self, staged: &Path, final_path: &Path) -> Result<PathBuf, DownloadError> {
        match tokio::fs::remove_file(final_path).await {
            Ok(()) => log::info!("覆盖已有文件: {}", final_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DownloadError::placement(final_path, e)),
        }
        tokio::fs::rename(staged, final_path)
            .await
            .map_err(|e| DownloadError::placement(final_path, e))?;
        Ok(final_path.to_path_buf())
    }

    /// 丢弃失败传输留下的暂存文件
    pub async fn discard(&self, staged: &Path) {
        if let Err(e) = tokio::fs::remove_file(staged).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("无法删除暂存文件 {}: {}", staged.display(), e);
            }
        }
    }
}
