//! Error types surfaced by a download job.
use thiserror::Error;

/// Coarse classification handed to collaborators alongside a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ProbeFailed,
    ChunkTransferFailed,
    MergeVerificationFailed,
    IoFailure,
    Cancelled,
    InvalidJob,
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Probe failed: {0}")]
    ProbeFailed(String),
    #[error("Chunk {index} failed after {attempts} attempt(s): {reason}")]
    ChunkTransferFailed {
        index: usize,
        attempts: u32,
        reason: String,
    },
    #[error("Merged file is {actual} bytes, expected {expected}")]
    MergeVerificationFailed { expected: u64, actual: u64 },
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("State file error: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("Invalid download job: {0}")]
    InvalidJob(String),
    #[error("Download already started or finished")]
    InvalidState,
    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::ProbeFailed(_) => ErrorKind::ProbeFailed,
            DownloadError::ChunkTransferFailed { .. } => ErrorKind::ChunkTransferFailed,
            DownloadError::MergeVerificationFailed { .. } => ErrorKind::MergeVerificationFailed,
            DownloadError::Io(_) | DownloadError::Manifest(_) => ErrorKind::IoFailure,
            DownloadError::Cancelled => ErrorKind::Cancelled,
            DownloadError::InvalidJob(_) | DownloadError::InvalidState => ErrorKind::InvalidJob,
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
