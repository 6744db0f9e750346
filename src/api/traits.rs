use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use super::client::Result;
use super::models::VideoMetadataResponse;
use crate::domain::VideoIdentifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceInfo {
    pub content_length: Option<u64>,
    pub supports_range: bool,
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn lookup(&self, id: &VideoIdentifier) -> Result<VideoMetadataResponse>;
}

#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn probe(&self, locator: &str) -> Result<SourceInfo>;

    /// Fetch the inclusive byte range `[start, end]`.
    async fn fetch_range(&self, locator: &str, start: u64, end: u64) -> Result<Bytes>;

    async fn open_stream(&self, locator: &str) -> Result<BoxStream<'static, Result<Bytes>>>;
}
