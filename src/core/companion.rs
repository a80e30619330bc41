//! 课程附属文件：简介、难度、作者、发布日期和练习文件压缩包
//!
//! 每个文件写入前先检查是否已存在，重复运行不会覆盖。

use std::path::{Path, PathBuf};
use std::rc::Rc;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tokio::io::AsyncWriteExt;

use crate::core::course::CourseInfo;
use crate::core::error::DownloadError;
use crate::core::placement::{sanitize_file_name, ArtifactPlacer, STAGED_PREFIX};
use crate::core::source::{ClipSource, CredentialProvider};
use crate::core::task::util::RateLimiter;

/// 练习文件压缩包的固定限速
pub const EXERCISE_MAX_SPEED: u64 = 115_200;

pub struct CompanionWriter {
    placer: ArtifactPlacer,
    source: Rc<dyn ClipSource>,
    credentials: Rc<dyn CredentialProvider>,
}

/// 格式化为 dd/mm/yyyy，无法识别时原样返回
pub fn format_release_date(raw: &str) -> String {
    let raw = raw.trim();
    let date = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"));
    match date {
        Ok(date) => date.format("%d/%m/%Y").to_string(),
        Err(_) => raw.to_string(),
    }
}

impl CompanionWriter {
    pub fn new(
        placer: ArtifactPlacer,
        source: Rc<dyn ClipSource>,
        credentials: Rc<dyn CredentialProvider>,
    ) -> Self {
        Self { placer, source, credentials }
    }

    /// 写入缺失的附属文件，返回本次新写入的文件
    pub async fn write(&self, course: &CourseInfo) -> Result<Vec<PathBuf>, DownloadError> {
        let dir = self.placer.course_dir(&course.title);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DownloadError::placement(&dir, e))?;

        let authors = course
            .authors
            .iter()
            .map(|a| a.display_name())
            .collect::<Vec<_>>()
            .join(", ");
        let texts = [
            ("description.txt", course.description.clone()),
            ("level.txt", course.level.clone()),
            ("authors.txt", authors),
            ("date.txt", format_release_date(&course.release_date)),
        ];

        let mut written = Vec::new();
        for (name, content) in texts {
            let path = dir.join(name);
            if write_if_missing(&path, content.as_bytes()).await? {
                written.push(path);
            }
        }

        if let Some(url) = course.exercise_files_url.as_deref().filter(|u| !u.is_empty()) {
            let file_name = sanitize_file_name(&format!("{}-exercise.zip", course.title));
            let path = dir.join(&file_name);
            if !path.exists() {
                self.download_exercise_files(url, &dir.join(format!("{}{}", STAGED_PREFIX, file_name)), &path)
                    .await?;
                written.push(path);
            }
        }
        Ok(written)
    }

    async fn download_exercise_files(&self, url: &str, staged: &Path, path: &Path) -> Result<(), DownloadError> {
        let credential = self.credentials.credential().await?;
        let clip = self.source.open(url, &credential).await?;
        let mut reader = RateLimiter::new(clip.body, EXERCISE_MAX_SPEED);

        let result = async {
            let mut file = tokio::fs::File::create(staged)
                .await
                .map_err(|e| DownloadError::placement(staged, e))?;
            while let Some(chunk) = reader.read(1024).await? {
                file.write_all(&chunk)
                    .await
                    .map_err(|e| DownloadError::placement(staged, e))?;
            }
            file.flush().await.map_err(|e| DownloadError::placement(staged, e))?;
            drop(file);
            self.placer.place(staged, path).await
        }
        .await;

        if result.is_err() {
            self.placer.discard(staged).await;
        }
        result.map(|_| log::info!("练习文件已保存: {}", path.display()))
    }
}

async fn write_if_missing(path: &Path, content: &[u8]) -> Result<bool, DownloadError> {
    if path.exists() {
        return Ok(false);
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| DownloadError::placement(path, e))?;
    Ok(true)
}
