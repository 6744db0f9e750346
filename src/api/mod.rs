pub mod client;
pub mod models;
pub mod traits;

pub use client::{ApiClient, ApiError, Result};
pub use models::{ApiConfig, PlayabilityStatus, StreamEntry, VideoMetadataResponse};
pub use traits::{ByteSource, MetadataProvider, SourceInfo};
