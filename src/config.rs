use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::api::ApiConfig;
use crate::domain::{EngineError, PartialDataPolicy, Result};

/// Default chunk size (256 KiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 256 * 1024;

const ENV_PREFIX: &str = "VIDEO_ENGINE_";

/// Top-level configuration for the download engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the metadata service.
    pub api_base_url: String,
    /// Size of each download chunk in bytes.
    pub chunk_size: u64,
    /// Number of ranged chunk fetches kept in flight.
    pub parallel_chunks: usize,
    /// Timeout for a single chunk fetch.
    pub chunk_timeout_ms: u64,
    /// Base delay for linear retry backoff.
    pub retry_backoff_ms: u64,
    /// Extra attempts for a failed sink write.
    pub write_retries: u32,
    /// Consecutive transient read failures tolerated before giving up.
    pub max_consecutive_failures: u32,
    /// Where `SessionController::download` places files.
    pub output_dir: PathBuf,
    pub keep_partial_on_cancel: bool,
    /// Capacity of the progress event channel.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: ApiConfig::default().base_url,
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel_chunks: 4,
            chunk_timeout_ms: 30_000,
            retry_backoff_ms: 500,
            write_retries: 3,
            max_consecutive_failures: 5,
            output_dir: PathBuf::from("./downloads"),
            keep_partial_on_cancel: false,
            event_buffer: 64,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `VIDEO_ENGINE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("API_BASE_URL") {
            config.api_base_url = v;
        }
        if let Some(v) = var("CHUNK_SIZE") {
            config.chunk_size = parse_number("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = var("PARALLEL_CHUNKS") {
            config.parallel_chunks = parse_number("PARALLEL_CHUNKS", &v)?;
        }
        if let Some(v) = var("CHUNK_TIMEOUT_MS") {
            config.chunk_timeout_ms = parse_number("CHUNK_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = var("RETRY_BACKOFF_MS") {
            config.retry_backoff_ms = parse_number("RETRY_BACKOFF_MS", &v)?;
        }
        if let Some(v) = var("WRITE_RETRIES") {
            config.write_retries = parse_number("WRITE_RETRIES", &v)?;
        }
        if let Some(v) = var("MAX_CONSECUTIVE_FAILURES") {
            config.max_consecutive_failures = parse_number("MAX_CONSECUTIVE_FAILURES", &v)?;
        }
        if let Some(v) = var("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = var("KEEP_PARTIAL_ON_CANCEL") {
            config.keep_partial_on_cancel = matches!(v.trim(), "1" | "true" | "yes");
        }
        if let Some(v) = var("EVENT_BUFFER") {
            config.event_buffer = parse_number("EVENT_BUFFER", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(EngineError::Config("chunk_size must be positive".into()));
        }
        if self.parallel_chunks == 0 {
            return Err(EngineError::Config("parallel_chunks must be positive".into()));
        }
        if self.max_consecutive_failures == 0 {
            return Err(EngineError::Config(
                "max_consecutive_failures must be positive".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(EngineError::Config("event_buffer must be positive".into()));
        }
        Ok(())
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn partial_data_policy(&self) -> PartialDataPolicy {
        if self.keep_partial_on_cancel {
            PartialDataPolicy::Keep
        } else {
            PartialDataPolicy::Discard
        }
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.api_base_url.clone(),
            ..ApiConfig::default()
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| EngineError::Config(format!("{}{} is not a number: {}", ENV_PREFIX, name, value)))
}
