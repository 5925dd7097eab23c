//! Metadata probe: total size and byte-range support.
use crate::error::{DownloadError, Result};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// Total size in bytes, 0 when the server did not report one.
    pub total_size: u64,
    pub accepts_ranges: bool,
}

/// Issues a HEAD request for `url`.
///
/// # Errors
///
/// Returns `ProbeFailed` if the request fails or the server answers with a
/// non-success status. There is no retry here.
pub async fn probe(
    client: &reqwest::Client,
    url: &str,
    headers: &HeaderMap,
    timeout: Duration,
) -> Result<ProbeResult> {
    let response = client
        .head(url)
        .headers(headers.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| DownloadError::ProbeFailed(e.to_string()))?;

    if !response.status().is_success() {
        return Err(DownloadError::ProbeFailed(format!(
            "Request failed. Status Code: {}",
            response.status()
        )));
    }

    let result = parse_headers(response.headers());
    debug!(url, total_size = result.total_size, accepts_ranges = result.accepts_ranges, "probed");
    Ok(result)
}

fn parse_headers(headers: &HeaderMap) -> ProbeResult {
    let total_size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);

    let accepts_ranges = headers
        .get_all(ACCEPT_RANGES)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"));

    ProbeResult {
        total_size,
        accepts_ranges,
    }
}
