//! 测试用的脚本化协作方

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::core::error::DownloadError;
use crate::core::events::EventHub;
use crate::core::placement::ArtifactPlacer;
use crate::core::source::{ClipSource, ClipStream, Credential, CredentialProvider, TemplateResolver};
use crate::core::task::download::{TransferExecutor, TransferSettings};

/// 单次 `open` 的预设结果
#[derive(Debug, Clone)]
pub enum Script {
    Body {
        data: Vec<u8>,
        declared: Option<u64>,
        chunk_delay: Duration,
    },
    Throttle,
    Unauthorized,
    Fail(&'static str),
    DiskFull,
}

impl Script {
    pub fn body(data: Vec<u8>) -> Self {
        let declared = Some(data.len() as u64);
        Script::Body { data, declared, chunk_delay: Duration::ZERO }
    }

    pub fn without_length(self) -> Self {
        self.declared_as(None)
    }

    pub fn declared(self, length: u64) -> Self {
        self.declared_as(Some(length))
    }

    pub fn slow(self, delay: Duration) -> Self {
        match self {
            Script::Body { data, declared, .. } => Script::Body { data, declared, chunk_delay: delay },
            other => other,
        }
    }

    fn declared_as(self, length: Option<u64>) -> Self {
        match self {
            Script::Body { data, chunk_delay, .. } => Script::Body { data, declared: length, chunk_delay },
            other => other,
        }
    }
}

/// 按地址依次返回预设结果，脚本用完后返回网络错误
#[derive(Clone, Default)]
pub struct ScriptedSource {
    scripts: Rc<RefCell<HashMap<String, VecDeque<Script>>>>,
    opened: Rc<RefCell<Vec<String>>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, script: Script) {
        self.scripts.borrow_mut().entry(url.to_string()).or_default().push_back(script);
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.borrow().clone()
    }
}

#[async_trait(?Send)]
impl ClipSource for ScriptedSource {
    async fn open(&self, url: &str, _credential: &Credential) -> Result<ClipStream, DownloadError> {
        self.opened.borrow_mut().push(url.to_string());
        let script = self.scripts.borrow_mut().get_mut(url).and_then(|q| q.pop_front());
        match script {
            Some(Script::Body { data, declared, chunk_delay }) => {
                let parts: Vec<Bytes> = data.chunks(512).map(Bytes::copy_from_slice).collect();
                let body = futures::stream::iter(parts)
                    .then(move |part| async move {
                        if !chunk_delay.is_zero() {
                            tokio::time::sleep(chunk_delay).await;
                        }
                        Ok::<_, DownloadError>(part)
                    })
                    .boxed_local();
                Ok(ClipStream { content_length: declared, body })
            }
            Some(Script::Throttle) => Err(DownloadError::throttled(format!("429 {}", url))),
            Some(Script::Unauthorized) => Err(DownloadError::authentication(format!("401 {}", url))),
            Some(Script::Fail(msg)) => Err(DownloadError::transport(msg)),
            Some(Script::DiskFull) => Err(DownloadError::placement(url, std::io::Error::from_raw_os_error(28))),
            None => Err(DownloadError::transport(format!("no script for {}", url))),
        }
    }
}

/// 记录调用次数，可设置为总是失败
#[derive(Clone)]
pub struct ScriptedCredentials {
    fail: bool,
    calls: Rc<Cell<u32>>,
}

impl ScriptedCredentials {
    pub fn ok() -> Self {
        Self { fail: false, calls: Rc::new(Cell::new(0)) }
    }

    pub fn failing() -> Self {
        Self { fail: true, calls: Rc::new(Cell::new(0)) }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

#[async_trait(?Send)]
impl CredentialProvider for ScriptedCredentials {
    async fn credential(&self) -> Result<Credential, DownloadError> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            Err(DownloadError::authentication("invalid user name or password"))
        } else {
            Ok(Credential::new("session=test"))
        }
    }
}

pub fn executor_for(
    source: ScriptedSource,
    credentials: ScriptedCredentials,
    base: &Path,
    hub: EventHub,
) -> TransferExecutor {
    TransferExecutor::new(
        Rc::new(source),
        Rc::new(TemplateResolver::new("1280x720", "1024x768")),
        Rc::new(credentials),
        ArtifactPlacer::new(base),
        hub,
        TransferSettings::default(),
    )
}
