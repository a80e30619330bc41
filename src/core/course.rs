//! 课程元数据与下载请求
//!
//! 元数据由外部提供（见 [`crate::core::metadata`]），这里只关心
//! 课程、章节、片段的标题与序号。

use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub first_name: String,
    pub last_name: String,
}

impl Author {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// 随课程一起保存的说明信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseInfo {
    /// 缺省时取清单文件名
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub exercise_files_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    /// 稳定标识，缺省时按课程/章节/序号生成
    #[serde(default)]
    pub name: String,
    pub title: String,
    /// 视频地址或可解析的定位串
    pub locator: String,
    #[serde(default)]
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub title: String,
    #[serde(default)]
    pub clips: Vec<Clip>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(flatten)]
    pub info: CourseInfo,
    #[serde(default)]
    pub supports_wide_screen_video_formats: bool,
    #[serde(default)]
    pub modules: Vec<Module>,
}

/// 落盘位置描述，序号均从 1 开始
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub course_title: String,
    pub module_title: String,
    pub module_ordinal: u32,
    pub clip_ordinal: u32,
    pub title: String,
    pub duration_seconds: u64,
}

/// 一次下载请求，创建后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub id: String,
    pub source: String,
    pub target: TargetDescriptor,
    pub wide_screen: bool,
}

impl Course {
    /// 按章节、片段顺序生成全部下载请求
    pub fn download_requests(&self) -> Vec<DownloadRequest> {
        self.modules
            .iter()
            .enumerate()
            .flat_map(|(m, module)| self.module_requests_at(m, module))
            .collect()
    }

    /// 只生成指定章节（1 起始）的请求，序号越界时返回空
    pub fn module_requests(&self, module_ordinal: u32) -> Vec<DownloadRequest> {
        let Some(index) = (module_ordinal as usize).checked_sub(1) else {
            return Vec::new();
        };
        match self.modules.get(index) {
            Some(module) => self.module_requests_at(index, module),
            None => Vec::new(),
        }
    }

    fn module_requests_at(&self, index: usize, module: &Module) -> Vec<DownloadRequest> {
        let module_ordinal = index as u32 + 1;
        module
            .clips
            .iter()
            .enumerate()
            .map(|(c, clip)| {
                let clip_ordinal = c as u32 + 1;
                let id = if clip.name.is_empty() {
                    format!("{}|{}|{}", self.info.id, module_ordinal, clip_ordinal)
                } else {
                    clip.name.clone()
                };
                DownloadRequest {
                    id,
                    source: clip.locator.clone(),
                    target: TargetDescriptor {
                        course_title: self.info.title.clone(),
                        module_title: module.title.clone(),
                        module_ordinal,
                        clip_ordinal,
                        title: clip.title.clone(),
                        duration_seconds: clip.duration_seconds,
                    },
                    wide_screen: self.supports_wide_screen_video_formats,
                }
            })
            .collect()
    }
}
