//! The caller-supplied description of one download.
use crate::error::{DownloadError, Result};
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use std::path::PathBuf;

/// Immutable request for one download, owned by its controller.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: String,
    pub dest_dir: PathBuf,
    pub filename: String,
    /// Desired number of concurrent chunk workers.
    pub concurrency: usize,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    /// Bytes already present from an interrupted single-stream download.
    pub resume_from: u64,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>, dest_dir: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dest_dir: dest_dir.into(),
            filename: filename.into(),
            concurrency: 4,
            headers: Vec::new(),
            cookies: Vec::new(),
            resume_from: 0,
        }
    }

    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn resume_from(mut self, bytes: u64) -> Self {
        self.resume_from = bytes;
        self
    }

    pub fn destination(&self) -> PathBuf {
        self.dest_dir.join(&self.filename)
    }

    /// Path of the partial file written by chunk worker `index`.
    pub fn part_path(&self, index: usize) -> PathBuf {
        self.dest_dir.join(format!("{}.part{}", self.filename, index))
    }

    /// Path of the persisted chunk plan.
    pub fn manifest_path(&self) -> PathBuf {
        self.dest_dir.join(format!("{}.state.json", self.filename))
    }

    /// Headers attached to every request of this job, cookies folded into one
    /// `Cookie` header.
    pub fn request_headers(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|e| DownloadError::InvalidJob(format!("header name {:?}: {}", name, e)))?;
            let value = HeaderValue::from_str(value.trim())
                .map_err(|e| DownloadError::InvalidJob(format!("header value for {}: {}", name, e)))?;
            map.append(name, value);
        }

        if !self.cookies.is_empty() {
            let joined = self
                .cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; ");
            let value = HeaderValue::from_str(&joined)
                .map_err(|e| DownloadError::InvalidJob(format!("cookie: {}", e)))?;
            map.insert(COOKIE, value);
        }

        Ok(map)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        url::Url::parse(&self.url)
            .map_err(|e| DownloadError::InvalidJob(format!("url {:?}: {}", self.url, e)))?;
        if self.filename.is_empty() {
            return Err(DownloadError::InvalidJob("empty filename".into()));
        }
        Ok(())
    }
}
