use std::path::{Path, PathBuf};
use std::rc::Rc;
use tokio::io::AsyncWriteExt;

use crate::core::course::DownloadRequest;
use crate::core::error::DownloadError;
use crate::core::events::{EventHub, ProgressExtra, TransferProgress};
use crate::core::placement::{ArtifactPlacer, Placement};
use crate::core::source::{ClipSource, ClipUrlResolver, Credential, CredentialProvider};
use super::util::{clip_max_speed, RateLimiter};

/// 传输参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    /// 每次读取并上报进度的块大小
    pub chunk_size: usize,
    /// 相对实时播放码率的倍数
    pub speed_multiplier: u64,
    /// 全局上限（B/s），0 表示不设
    pub speed_cap: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            speed_multiplier: 2,
            speed_cap: 0,
        }
    }
}

/// 已经落盘的片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalFile {
    pub path: PathBuf,
    pub bytes: u64,
}

/// 执行单个片段的限速下载
///
/// 流程：取凭据 -> 解析地址 -> 建目录 -> 打开流 -> 按块写入暂存文件并上报进度
/// -> 上报结束事件 -> 提升为最终文件。任何一步失败都会删除暂存文件。
pub struct TransferExecutor {
    source: Rc<dyn ClipSource>,
    resolver: Rc<dyn ClipUrlResolver>,
    credentials: Rc<dyn CredentialProvider>,
    placer: ArtifactPlacer,
    hub: EventHub,
    settings: TransferSettings,
}

impl TransferExecutor {
    pub fn new(
        source: Rc<dyn ClipSource>,
        resolver: Rc<dyn ClipUrlResolver>,
        credentials: Rc<dyn CredentialProvider>,
        placer: ArtifactPlacer,
        hub: EventHub,
        settings: TransferSettings,
    ) -> Self {
        Self { source, resolver, credentials, placer, hub, settings }
    }

    pub fn placer(&self) -> &ArtifactPlacer {
        &self.placer
    }

    pub fn source(&self) -> Rc<dyn ClipSource> {
        self.source.clone()
    }

    pub fn credentials(&self) -> Rc<dyn CredentialProvider> {
        self.credentials.clone()
    }

    pub async fn execute(&self, request: &DownloadRequest) -> Result<FinalFile, DownloadError> {
        let credential = self.credentials.credential().await?;
        let url = self
            .resolver
            .resolve(&request.source, request.wide_screen, &credential)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DownloadError::transport(format!("没有可用的视频地址: {}", request.id)))?;

        let placement = self.placer.layout(&request.target);
        self.placer.prepare(&placement).await?;

        let staged = placement.staged_path();
        let result = match self.stream_to_staged(request, &url, &credential, &placement, &staged).await {
            Ok(bytes) => self
                .placer
                .place(&staged, &placement.final_path())
                .await
                .map(|path| FinalFile { path, bytes }),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.placer.discard(&staged).await;
        }
        result
    }

    async fn stream_to_staged(
        &self,
        request: &DownloadRequest,
        url: &str,
        credential: &Credential,
        placement: &Placement,
        staged: &Path,
    ) -> Result<u64, DownloadError> {
        let clip = self.source.open(url, credential).await?;
        let total = clip.content_length.unwrap_or(0);
        let max_speed = clip_max_speed(
            request.target.duration_seconds,
            total,
            self.settings.speed_multiplier,
            self.settings.speed_cap,
        );
        log::info!(
            "开始下载 {} -> {} ({} 字节, 限速 {})",
            url,
            placement.final_path().display(),
            total,
            if max_speed == 0 { "无".to_string() } else { format!("{} B/s", max_speed) }
        );

        let mut reader = RateLimiter::new(clip.body, max_speed);
        let mut file = tokio::fs::File::create(staged)
            .await
            .map_err(|e| DownloadError::placement(staged, e))?;

        let extra = ProgressExtra {
            module_ordinal: request.target.module_ordinal,
            clip_ordinal: request.target.clip_ordinal,
        };
        let progress = |received: u64, is_downloading: bool| TransferProgress {
            id: request.id.clone(),
            file_name: placement.file_name.clone(),
            bytes_received: received,
            total_bytes: total,
            is_downloading,
            extra,
        };

        let mut received = 0u64;
        while let Some(chunk) = reader.read(self.settings.chunk_size).await? {
            received += chunk.len() as u64;
            if total > 0 && received > total {
                return Err(DownloadError::transport(format!(
                    "数据超出声明长度: 预期 {} 字节, 已收到 {} 字节",
                    total, received
                )));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::placement(staged, e))?;
            self.hub.publish_progress(progress(received, true));
        }

        file.flush().await.map_err(|e| DownloadError::placement(staged, e))?;
        drop(file);

        if total > 0 && received < total {
            return Err(DownloadError::transport(format!(
                "连接提前断开: 预期 {} 字节, 实际 {} 字节",
                total, received
            )));
        }

        self.hub.publish_progress(progress(received, false));
        Ok(received)
    }
}
