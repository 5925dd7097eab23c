//! Persisted chunk plan.
//!
//! Written next to the partial files as `<finalname>.state.json` so a resumed
//! download maps each `.partN` file back to the range it was downloaded for,
//! even if the planner's tiers change between versions.
use crate::error::Result;
use crate::planner::{Chunk, ChunkPlan};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// The source URL of the file.
    pub url: String,
    pub total_size: u64,
    pub chunks: Vec<Chunk>,
}

impl Manifest {
    pub fn new(url: &str, total_size: u64, chunks: ChunkPlan) -> Self {
        Self {
            url: url.to_string(),
            total_size,
            chunks,
        }
    }

    /// Whether this manifest describes the same remote file.
    pub fn matches(&self, url: &str, total_size: u64) -> bool {
        self.url == url && self.total_size == total_size && covers(&self.chunks, total_size)
    }
}

fn covers(chunks: &[Chunk], total_size: u64) -> bool {
    let mut next = 0;
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.index != i || chunk.start != next || chunk.end < chunk.start {
            return false;
        }
        next = chunk.end + 1;
    }
    !chunks.is_empty() && next == total_size
}

/// Saves the manifest as pretty JSON.
///
/// # Errors
///
/// This function will return an error if the file cannot be created or written to.
pub async fn save(manifest: &Manifest, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Loads a manifest, returning `None` when the file is missing or unreadable.
pub async fn load(path: &Path) -> Option<Manifest> {
    let json = tokio::fs::read_to_string(path).await.ok()?;
    serde_json::from_str(&json).ok()
}
