use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub state_file: PathBuf,
    pub media_dir: PathBuf,
    pub trigger_url: Option<String>,
    pub processing_url: Option<String>,
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let data_dir = non_empty("LISTING_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));

        let http_timeout_secs: u64 = non_empty("LISTING_HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|| "60".to_string())
            .parse()
            .context("LISTING_HTTP_TIMEOUT_SECS must be a valid number")?;

        Ok(Self {
            archive_dir: non_empty("LISTING_ARCHIVE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("archived")),
            state_file: non_empty("LISTING_STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("state.json")),
            media_dir: non_empty("LISTING_MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("media")),
            trigger_url: non_empty("LISTING_TRIGGER_URL"),
            processing_url: non_empty("LISTING_PROCESSING_URL"),
            http_timeout: Duration::from_secs(http_timeout_secs),
            data_dir,
        })
    }
}
