//! 传输核心依赖的外部协作方：凭据、视频地址解析、字节流来源
//!
//! awc 的 future 不是 `Send` 的，这里的 trait 都使用 `?Send`，
//! 实现放在 `Rc` 中与队列 actor 共享。

use std::fmt;
use std::time::Duration;
use async_trait::async_trait;
use awc::http::{header, StatusCode};
use bytes::Bytes;
use futures::stream::LocalBoxStream;
use futures::StreamExt;

use crate::config::Config;
use crate::core::error::DownloadError;
use crate::utils::validator::is_valid_url;

/// 不透明的凭据，核心只负责附带在请求上
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(Option<String>);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        if token.trim().is_empty() {
            Self(None)
        } else {
            Self(Some(token))
        }
    }

    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn token(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Credential(***)"),
            None => f.write_str("Credential(anonymous)"),
        }
    }
}

#[async_trait(?Send)]
pub trait CredentialProvider {
    /// 获取凭据；失败时应返回 `DownloadError::Authentication`
    async fn credential(&self) -> Result<Credential, DownloadError>;
}

/// 由配置或命令行直接给出的凭据，刷新由调用方负责
pub struct StaticCredentials {
    credential: Credential,
}

impl StaticCredentials {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }
}

#[async_trait(?Send)]
impl CredentialProvider for StaticCredentials {
    async fn credential(&self) -> Result<Credential, DownloadError> {
        Ok(self.credential.clone())
    }
}

#[async_trait(?Send)]
pub trait ClipUrlResolver {
    /// 返回候选地址，调用方总是取第一个
    async fn resolve(
        &self,
        locator: &str,
        wide_screen: bool,
        credential: &Credential,
    ) -> Result<Vec<String>, DownloadError>;
}

/// 把定位串中的 `{quality}` 替换为对应分辨率
pub struct TemplateResolver {
    wide_quality: String,
    standard_quality: String,
}

impl TemplateResolver {
    pub const PLACEHOLDER: &'static str = "{quality}";

    pub fn new(wide_quality: impl Into<String>, standard_quality: impl Into<String>) -> Self {
        Self {
            wide_quality: wide_quality.into(),
            standard_quality: standard_quality.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.wide_quality.clone(), config.standard_quality.clone())
    }
}

#[async_trait(?Send)]
impl ClipUrlResolver for TemplateResolver {
    async fn resolve(
        &self,
        locator: &str,
        wide_screen: bool,
        _credential: &Credential,
    ) -> Result<Vec<String>, DownloadError> {
        let quality = if wide_screen { &self.wide_quality } else { &self.standard_quality };
        let url = locator.replace(Self::PLACEHOLDER, quality);
        if !is_valid_url(&url) {
            return Err(DownloadError::invalid_url(url));
        }
        Ok(vec![url])
    }
}

/// 打开后的远端字节流
pub struct ClipStream {
    /// 响应头声明的长度，缺失时为 None
    pub content_length: Option<u64>,
    pub body: LocalBoxStream<'static, Result<Bytes, DownloadError>>,
}

#[async_trait(?Send)]
pub trait ClipSource {
    async fn open(&self, url: &str, credential: &Credential) -> Result<ClipStream, DownloadError>;
}

/// HTTP 状态码归类，成功时返回 None
pub fn classify_status(status: StatusCode, url: &str) -> Option<DownloadError> {
    match status.as_u16() {
        200..=299 => None,
        429 => Some(DownloadError::throttled(format!("短时间内请求过多: {}", url))),
        401 | 403 | 422 => Some(DownloadError::authentication(format!("无权访问 ({}): {}", status, url))),
        _ => Some(DownloadError::transport(format!("服务器错误 ({}): {}", status, url))),
    }
}

/// 基于 awc 的字节流来源
pub struct HttpClipSource {
    client: awc::Client,
}

impl HttpClipSource {
    pub fn new(config: &Config) -> Self {
        let client = awc::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .add_default_header((header::USER_AGENT, config.user_agent.clone()))
            .finish();
        Self { client }
    }
}

#[async_trait(?Send)]
impl ClipSource for HttpClipSource {
    async fn open(&self, url: &str, credential: &Credential) -> Result<ClipStream, DownloadError> {
        let mut request = self
            .client
            .get(url)
            .insert_header((header::ACCEPT_ENCODING, "identity"));
        if let Some(token) = credential.token() {
            request = request.insert_header((header::COOKIE, token.to_string()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::transport(format!("请求失败 {}: {}", url, e)))?;

        if let Some(err) = classify_status(response.status(), url) {
            log::warn!("{}", err);
            return Err(err);
        }

        let content_length = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let body = response
            .map(|chunk| chunk.map_err(|e| DownloadError::transport(format!("数据流中断: {}", e))))
            .boxed_local();

        Ok(ClipStream { content_length, body })
    }
}
