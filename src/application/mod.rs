pub mod catalog_resolver;
pub mod chunked_downloader;
pub mod progress;
pub mod session_controller;
pub mod sink;
pub mod stream_selector;

pub use catalog_resolver::StreamCatalogResolver;
pub use chunked_downloader::{ChunkedDownloader, DownloadControl, DownloadHandle};
pub use progress::ProgressAggregator;
pub use session_controller::{DownloadStream, SessionController};
pub use sink::{ByteSink, FileSink, MemorySink};
