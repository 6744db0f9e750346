use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Response from the `/videos/{id}` endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoMetadataResponse {
    pub title: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub playability_status: PlayabilityStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub streams: Vec<StreamEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayabilityStatus {
    #[default]
    Ok,
    LoginRequired,
    AgeRestricted,
    RegionRestricted,
    UnplayableNotFound,
    Unplayable,
}

/// One entry of the `streams` array
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamEntry {
    pub resolution: String,
    #[serde(default)]
    pub codec: String,
    #[serde(default)]
    pub container: String,
    #[serde(default)]
    pub content_length: Option<u64>,
    #[serde(default)]
    pub url: String,
    /// Unix seconds
    #[serde(default)]
    pub expires_at: Option<u64>,
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub user_agent: String,
    pub connect_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8787/api/v1".to_string(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_defaults() {
        let json = r#"{"title":"Sample YouTube Video Title"}"#;
        let parsed: VideoMetadataResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.playability_status, PlayabilityStatus::Ok);
        assert!(parsed.streams.is_empty());
        assert!(parsed.thumbnail_url.is_none());
    }

    #[test]
    fn test_playability_wire_names() {
        let parsed: PlayabilityStatus = serde_json::from_str(r#""UNPLAYABLE_NOT_FOUND""#).unwrap();
        assert_eq!(parsed, PlayabilityStatus::UnplayableNotFound);
        let parsed: PlayabilityStatus = serde_json::from_str(r#""LOGIN_REQUIRED""#).unwrap();
        assert_eq!(parsed, PlayabilityStatus::LoginRequired);
    }

    #[test]
    fn test_stream_entry_optional_fields() {
        let json = r#"{"resolution":"720p","codec":"avc1","container":"mp4","url":"http://cdn/v","expires_at":1900000000}"#;
        let entry: StreamEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.content_length, None);
        assert_eq!(entry.expires_at, Some(1900000000));
    }
}
