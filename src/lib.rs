//! # segfetch
//!
//! `segfetch` is a library for segmented, resumable HTTP downloads.
//! It supports:
//! - Splitting a file into byte ranges downloaded by concurrent workers
//! - Resuming from partial files left by an interrupted run
//! - Per-chunk retries with linear backoff
//! - Pause / resume / cancel of a running job
//! - Throttled progress and throughput events
//!
//! ## Example Usage
//!
//! ```no_run
//! use segfetch::{DownloadController, DownloadJob, DownloadOptions, NoopObserver};
//! use std::sync::Arc;
//!
//! # async fn run() -> segfetch::Result<()> {
//! let job = DownloadJob::new("https://example.com/big.iso", "downloads", "big.iso").concurrency(8);
//! let controller = DownloadController::new(job, DownloadOptions::default(), Arc::new(NoopObserver))?;
//! let size = controller.start().await?;
//! # let _ = size;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod gate;
pub mod job;
pub mod manifest;
pub mod merger;
pub mod observer;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod state;
pub mod utils;
pub mod worker;

pub use config::{DownloadOptions, Settings};
pub use controller::DownloadController;
pub use error::{DownloadError, ErrorKind, Result};
pub use job::DownloadJob;
pub use observer::{ChannelObserver, ConsoleObserver, DownloadEvent, NoopObserver, ProgressObserver};
pub use planner::{Chunk, ChunkPlan, plan_chunks};
pub use probe::ProbeResult;
pub use progress::ProgressEvent;
pub use state::DownloadState;
