//! Utility helpers used across the crate.
//!
//! Filename extraction for jobs without an explicit name, and SHA-256
//! verification of finished files.
use anyhow::{Result, anyhow};
use indicatif::ProgressBar;
use percent_encoding::percent_decode_str;
use sanitize_filename::sanitize;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use url::Url;

/// Hex-encoded SHA-256 of a file, advancing `pb` as it reads.
pub fn sha256_file(path: &Path, pb: &ProgressBar) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    pb.set_length(file.metadata()?.len());

    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 64 * 1024];

    loop {
        let count = file.read(&mut buffer)?;
        if count == 0 {
            break;
        }

        hasher.update(&buffer[..count]);
        pb.inc(count as u64);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Calculates the SHA-256 hash of a file and compares it to an expected hash.
///
/// # Returns
///
/// Returns `Ok(())` if the hashes match. Returns an `Err` if they do not match
/// or if the file cannot be read.
pub fn verify_file_integrity(path: &Path, expected_hash: &str, pb: &ProgressBar) -> Result<()> {
    let actual_hash = sha256_file(path, pb)?;

    if actual_hash == expected_hash.trim().to_lowercase() {
        Ok(())
    } else {
        Err(anyhow!(
            "File corruption detected: expected {}, got {}",
            expected_hash,
            actual_hash
        ))
    }
}

/// Extracts a clean filename from a URL.
///
/// Takes the last path segment, URL-decodes and sanitizes it, and falls back
/// to "output.bin" if nothing usable is left.
pub fn get_filename_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .map(|mut s| s.next_back().unwrap_or("").to_string())
        })
        .map(|s| percent_decode_str(&s).decode_utf8_lossy().to_string())
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output.bin".to_string())
}
