use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use super::models::{ApiConfig, VideoMetadataResponse};
use super::traits::{ByteSource, MetadataProvider, SourceInfo};
use crate::domain::VideoIdentifier;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("API returned status {0}")]
    Status(u16),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Body ended early: expected {expected} bytes, got {received}")]
    Incomplete { expected: u64, received: u64 },
}

impl ApiError {
    /// Timeouts, connection drops and server-side hiccups are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::RequestError(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            ApiError::Timeout | ApiError::Incomplete { .. } => true,
            ApiError::Status(status) => *status >= 500 || *status == 408 || *status == 429,
            ApiError::InvalidResponse(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Clone)]
pub struct ApiClient {
    config: ApiConfig,
    client: Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    fn check_status(status: StatusCode, what: &str) -> Result<()> {
        if status.is_success() {
            return Ok(());
        }
        warn!("{} failed status={}", what, status.as_u16());
        Err(ApiError::Status(status.as_u16()))
    }

    /// Total length from `Content-Range: bytes 0-0/<total>`
    fn parse_content_range_total(value: &str) -> Option<u64> {
        value.rsplit('/').next()?.trim().parse::<u64>().ok()
    }

    /// Fetch metadata and the list of encoded streams for one video
    pub async fn get_video_metadata(&self, video_id: &str) -> Result<VideoMetadataResponse> {
        let url = format!(
            "{}/videos/{}",
            self.config.base_url.trim_end_matches('/'),
            video_id
        );
        debug!("metadata lookup url={}", url);

        let response = self.client.get(&url).send().await?;
        Self::check_status(response.status(), "metadata lookup")?;

        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("JSON decode error: {}", e)))
    }

    /// Stream the whole body; returns (total_size, stream)
    pub async fn download_file_stream(
        &self,
        download_url: &str,
    ) -> Result<(Option<u64>, BoxStream<'static, Result<Bytes>>)> {
        let response = self.client.get(download_url).send().await?;
        Self::check_status(response.status(), "download request")?;

        let total_size = response.content_length();
        let stream = response
            .bytes_stream()
            .map_err(ApiError::RequestError)
            .boxed();

        Ok((total_size, stream))
    }
}

#[async_trait]
impl MetadataProvider for ApiClient {
    async fn lookup(&self, id: &VideoIdentifier) -> Result<VideoMetadataResponse> {
        self.get_video_metadata(id.as_str()).await
    }
}

#[async_trait]
impl ByteSource for ApiClient {
    async fn probe(&self, locator: &str) -> Result<SourceInfo> {
        let response = self
            .client
            .get(locator)
            .header(RANGE, "bytes=0-0")
            .send()
            .await?;
        let status = response.status();
        debug!("probe status={}", status.as_u16());
        let range_total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse_content_range_total);

        // An empty resource cannot satisfy `bytes=0-0`.
        if status == StatusCode::RANGE_NOT_SATISFIABLE && range_total == Some(0) {
            return Ok(SourceInfo {
                content_length: Some(0),
                supports_range: true,
            });
        }
        Self::check_status(status, "probe")?;

        let info = if status == StatusCode::PARTIAL_CONTENT {
            SourceInfo {
                content_length: range_total,
                supports_range: range_total.is_some(),
            }
        } else {
            SourceInfo {
                content_length: response.content_length(),
                supports_range: false,
            }
        };
        Ok(info)
    }

    async fn fetch_range(&self, locator: &str, start: u64, end: u64) -> Result<Bytes> {
        let range = format!("bytes={}-{}", start, end);
        let response = self
            .client
            .get(locator)
            .header(RANGE, &range)
            .send()
            .await?;
        let status = response.status();
        Self::check_status(status, "range fetch")?;
        if status != StatusCode::PARTIAL_CONTENT {
            return Err(ApiError::InvalidResponse(format!(
                "range {} not honoured (status {})",
                range,
                status.as_u16()
            )));
        }

        Ok(response.bytes().await?)
    }

    async fn open_stream(&self, locator: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        let (_, stream) = self.download_file_stream(locator).await?;
        Ok(stream)
    }
}
