//! Tunables for a download job and the optional user settings file.
//!
//! `DownloadOptions` carries the per-job knobs (timeouts, retry budget,
//! buffer sizes). `Settings` is read from
//! `<config_dir>/segfetch/config.json` and only supplies defaults for the CLI.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Size of a single read/write buffer during transfer.
pub const TRANSFER_BUFFER_SIZE: usize = 128 * 1024;
/// Buffer used when concatenating partial files.
pub const MERGE_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Attempts per chunk, including the first one.
    pub max_attempts: u32,
    /// Backoff before retry `n` is `n * retry_backoff`.
    pub retry_backoff: Duration,
    pub connect_timeout: Duration,
    /// Per-read timeout on data transfers.
    pub read_timeout: Duration,
    /// Total timeout of the metadata probe.
    pub probe_timeout: Duration,
    pub transfer_buffer_size: usize,
    pub merge_buffer_size: usize,
    /// Bytes per second shared by every worker of the job.
    pub rate_limit: Option<u32>,
    pub user_agent: String,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            transfer_buffer_size: TRANSFER_BUFFER_SIZE,
            merge_buffer_size: MERGE_BUFFER_SIZE,
            rate_limit: None,
            user_agent: format!("segfetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl DownloadOptions {
    /// Builds the HTTP client used for both probing and data transfer.
    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .build()
    }
}

/// User-level defaults loaded from disk. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub threads: Option<u8>,
    pub default_dir: Option<String>,
    pub rate_limit: Option<u32>,
    pub user_agent: Option<String>,
}

impl Settings {
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("segfetch").join("config.json"))
    }

    /// Loads the settings file, returning defaults when it does not exist.
    pub fn load() -> anyhow::Result<Self> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Folds the file settings into a set of job options.
    pub fn apply(&self, options: &mut DownloadOptions) {
        if let Some(rate) = self.rate_limit {
            options.rate_limit = Some(rate);
        }
        if let Some(ref agent) = self.user_agent {
            options.user_agent = agent.clone();
        }
    }
}
