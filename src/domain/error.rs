use thiserror::Error;

use crate::api::ApiError;

use super::model::SessionState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Invalid YouTube URL or video ID: {0}")]
    InvalidReference(String),

    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    #[error("Video not found: {0}")]
    NotFound(String),

    #[error("Video access restricted: {0}")]
    Restricted(String),

    #[error("No streams available")]
    NoStreamsAvailable,

    #[error("Unsupported resolution label: {0}")]
    UnsupportedResolution(String),

    #[error("Sink write failed: {0}")]
    SinkWriteFailed(String),

    #[error("Gave up after {attempts} consecutive transient failures: {last_error}")]
    TransientFailureExceeded { attempts: u32, last_error: String },

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Map a non-transient transport error onto the engine taxonomy.
    pub fn from_api(err: &ApiError) -> Self {
        match err {
            ApiError::Status(404 | 410) => EngineError::NotFound(err.to_string()),
            ApiError::Status(401 | 403 | 451) => EngineError::Restricted(err.to_string()),
            _ => EngineError::Unreachable(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_api_status_mapping() {
        assert!(matches!(
            EngineError::from_api(&ApiError::Status(404)),
            EngineError::NotFound(_)
        ));
        assert!(matches!(
            EngineError::from_api(&ApiError::Status(451)),
            EngineError::Restricted(_)
        ));
        assert!(matches!(
            EngineError::from_api(&ApiError::Status(500)),
            EngineError::Unreachable(_)
        ));
        assert!(matches!(
            EngineError::from_api(&ApiError::Timeout),
            EngineError::Unreachable(_)
        ));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = EngineError::InvalidState {
            operation: "download",
            state: SessionState::Idle,
        };
        assert_eq!(err.to_string(), "Cannot download while idle");
    }
}
