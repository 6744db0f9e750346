pub mod error;
pub mod model;

pub use error::{EngineError, Result};
pub use model::{
    DownloadEvent, DownloadSession, PartialDataPolicy, Progress, Resolution, SessionState,
    StreamVariant, VideoCatalog, VideoIdentifier,
};
