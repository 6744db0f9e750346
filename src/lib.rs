//! Resolve a video reference to its downloadable resolutions, then fetch one
//! of them in chunks while reporting progress.

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod utils;

pub use application::{
    ByteSink, ChunkedDownloader, DownloadStream, FileSink, MemorySink, SessionController,
    StreamCatalogResolver,
};
pub use config::EngineConfig;
pub use domain::{
    DownloadEvent, DownloadSession, EngineError, PartialDataPolicy, Progress, Resolution,
    SessionState, StreamVariant, VideoCatalog, VideoIdentifier,
};
