use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::error::EngineError;
use crate::utils::extract_video_id;

/// Validated platform video ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoIdentifier(String);

impl VideoIdentifier {
    /// Extract and validate an identifier from a URL or a bare ID.
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        extract_video_id(input)
            .map(VideoIdentifier)
            .ok_or_else(|| EngineError::InvalidReference(input.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static RESOLUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2,4})[pP](\d{2,3})?$").expect("static regex"));

/// A `<height>p` label, optionally with a frame rate suffix (`720p60`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub height: u32,
    pub fps: Option<u32>,
}

impl Resolution {
    pub fn parse(label: &str) -> Option<Self> {
        let caps = RESOLUTION_RE.captures(label.trim())?;
        let height = caps[1].parse().ok()?;
        let fps = caps.get(2).and_then(|m| m.as_str().parse().ok());
        Some(Self { height, fps })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fps {
            Some(fps) => write!(f, "{}p{}", self.height, fps),
            None => write!(f, "{}p", self.height),
        }
    }
}

/// One encoded rendition of a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamVariant {
    pub resolution: Resolution,
    pub codec: String,
    pub container: String,
    pub approximate_size: Option<u64>,
    pub locator: String,
    /// Unix seconds after which the locator stops working.
    pub expiry: Option<u64>,
}

impl StreamVariant {
    pub fn resolution_label(&self) -> String {
        self.resolution.to_string()
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCatalog {
    pub id: VideoIdentifier,
    pub title: String,
    pub thumbnail_url: String,
    /// Sorted by height descending, then container, codec and locator.
    pub variants: Vec<StreamVariant>,
}

impl VideoCatalog {
    pub fn resolution_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for variant in &self.variants {
            let label = variant.resolution_label();
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        labels
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Previewing,
    PreviewReady,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Previewing => "previewing",
            SessionState::PreviewReady => "preview ready",
            SessionState::Downloading => "downloading",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Snapshot of one download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSession {
    pub id: u64,
    pub catalog: VideoCatalog,
    pub variant: StreamVariant,
    pub bytes_written: u64,
    pub total_bytes: Option<u64>,
    pub state: SessionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Percent(u8),
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Started {
        total_bytes: Option<u64>,
        ranged: bool,
    },
    Progress {
        progress: Progress,
        bytes_written: u64,
        total_bytes: Option<u64>,
    },
    /// The source could not resume; the sink was truncated and the transfer restarted.
    ResumedFromStart,
    Completed {
        bytes_written: u64,
    },
    Failed(EngineError),
    Cancelled {
        bytes_written: u64,
    },
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadEvent::Completed { .. }
                | DownloadEvent::Failed(_)
                | DownloadEvent::Cancelled { .. }
        )
    }
}

/// What happens to already-written bytes when a download is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialDataPolicy {
    Keep,
    Discard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_parse() {
        assert_eq!(
            Resolution::parse("1080p"),
            Some(Resolution {
                height: 1080,
                fps: None
            })
        );
        assert_eq!(
            Resolution::parse("720p60"),
            Some(Resolution {
                height: 720,
                fps: Some(60)
            })
        );
        assert_eq!(Resolution::parse(" 144p "), Resolution::parse("144p"));
        assert_eq!(Resolution::parse("audio"), None);
        assert_eq!(Resolution::parse("p720"), None);
    }

    #[test]
    fn test_resolution_display_round_trips_label() {
        assert_eq!(Resolution::parse("720p60").unwrap().to_string(), "720p60");
        assert_eq!(Resolution::parse("360P").unwrap().to_string(), "360p");
    }

    #[test]
    fn test_variant_expiry() {
        let variant = StreamVariant {
            resolution: Resolution::parse("360p").unwrap(),
            codec: "avc1".to_string(),
            container: "mp4".to_string(),
            approximate_size: None,
            locator: "http://example.invalid/v".to_string(),
            expiry: Some(100),
        };
        assert!(!variant.is_expired(99));
        assert!(variant.is_expired(100));
    }

    #[test]
    fn test_identifier_parse_rejects_garbage() {
        assert!(matches!(
            VideoIdentifier::parse("https://example.com/watch?v=dQw4w9WgXcQ"),
            Err(EngineError::InvalidReference(_))
        ));
        assert_eq!(
            VideoIdentifier::parse("https://youtu.be/dQw4w9WgXcQ")
                .unwrap()
                .as_str(),
            "dQw4w9WgXcQ"
        );
    }
}
