//! 课程元数据提供方
//!
//! 课程清单以 JSON 文件形式存在；读取结果放进 [`CourseCache`]，
//! 过期时间和淘汰由调用方决定，下载核心本身不持有任何课程状态。

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;

use crate::core::course::Course;
use crate::core::error::DownloadError;

#[async_trait(?Send)]
pub trait MetadataProvider {
    async fn course(&self, key: &str) -> Result<Arc<Course>, DownloadError>;
}

/// 课程缓存，`ttl == None` 表示永不过期
#[derive(Debug, Default)]
pub struct CourseCache {
    ttl: Option<Duration>,
    entries: HashMap<String, (Instant, Arc<Course>)>,
}

impl CourseCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self { ttl, entries: HashMap::new() }
    }

    pub fn get(&self, key: &str) -> Option<Arc<Course>> {
        let (stored_at, course) = self.entries.get(key)?;
        match self.ttl {
            Some(ttl) if stored_at.elapsed() >= ttl => None,
            _ => Some(course.clone()),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, course: Arc<Course>) {
        self.entries.insert(key.into(), (Instant::now(), course));
    }

    pub fn evict(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// 清理过期条目，返回清理数量
    pub fn evict_expired(&mut self) -> usize {
        let Some(ttl) = self.ttl else { return 0 };
        let before = self.entries.len();
        self.entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 从本地 JSON 清单读取课程，键为清单路径
pub struct ManifestProvider {
    cache: RefCell<CourseCache>,
}

impl ManifestProvider {
    pub fn new(cache: CourseCache) -> Self {
        Self { cache: RefCell::new(cache) }
    }

    pub fn parse(key: &str, content: &str) -> Result<Course, DownloadError> {
        let mut course: Course = serde_json::from_str(content)
            .map_err(|e| DownloadError::metadata(format!("无法解析课程清单 {}: {}", key, e)))?;
        if course.info.title.trim().is_empty() {
            return Err(DownloadError::metadata(format!("课程清单缺少标题: {}", key)));
        }
        if course.info.id.is_empty() {
            course.info.id = Path::new(key)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| key.to_string());
        }
        Ok(course)
    }
}

#[async_trait(?Send)]
impl MetadataProvider for ManifestProvider {
    async fn course(&self, key: &str) -> Result<Arc<Course>, DownloadError> {
        if let Some(course) = self.cache.borrow().get(key) {
            return Ok(course);
        }
        let content = tokio::fs::read_to_string(key)
            .await
            .map_err(|e| DownloadError::metadata(format!("无法读取课程清单 {}: {}", key, e)))?;
        let course = Arc::new(Self::parse(key, &content)?);
        log::info!("加载课程 {} ({} 个章节)", course.info.title, course.modules.len());
        let mut cache = self.cache.borrow_mut();
        let evicted = cache.evict_expired();
        if evicted > 0 {
            log::debug!("清理 {} 个过期课程缓存", evicted);
        }
        cache.insert(key, course.clone());
        Ok(course)
    }
}
