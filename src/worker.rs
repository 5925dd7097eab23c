//! Chunk and single-stream workers.
//!
//! Both kinds run the same loop: measure what is already on disk, request
//! the rest, append every received buffer after passing the pause gate, and
//! retry from the new on-disk offset when an attempt fails. The shared
//! counter is reconciled against the on-disk length before every attempt,
//! so bytes that were counted but lost with a failed attempt are rolled back.
use crate::config::DownloadOptions;
use crate::error::{DownloadError, Result};
use crate::gate::PauseGate;
use crate::observer::ProgressObserver;
use crate::planner::Chunk;
use crate::progress::ProgressAggregator;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter, clock::DefaultClock};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RANGE};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Bytes-per-second limiter shared by all workers of a job.
pub struct ByteRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    burst: NonZeroU32,
}

pub type ArcRateLimiter = Arc<ByteRateLimiter>;

impl ByteRateLimiter {
    /// `None` when `bytes_per_sec` is zero.
    pub fn per_second(bytes_per_sec: u32) -> Option<ArcRateLimiter> {
        let burst = NonZeroU32::new(bytes_per_sec)?;
        Some(Arc::new(Self {
            limiter: RateLimiter::direct(Quota::per_second(burst)),
            burst,
        }))
    }

    /// Waits until `len` bytes may pass. Larger requests than the burst are
    /// split, since the limiter rejects them outright.
    pub async fn consume(&self, len: usize) {
        let mut remaining = len as u64;
        while remaining > 0 {
            let step = remaining.min(self.burst.get() as u64) as u32;
            if let Some(n) = NonZeroU32::new(step) {
                let _ = self.limiter.until_n_ready(n).await;
            }
            remaining -= step as u64;
        }
    }
}

/// State a worker shares with its siblings in the same job.
#[derive(Clone)]
pub struct WorkerContext {
    pub client: reqwest::Client,
    pub url: String,
    pub headers: HeaderMap,
    pub progress: Arc<ProgressAggregator>,
    pub observer: Arc<dyn ProgressObserver>,
    pub gate: PauseGate,
    pub cancel: CancellationToken,
    pub limiter: Option<ArcRateLimiter>,
    pub options: DownloadOptions,
}

#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Fatal(DownloadError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Transfer(String),
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        AttemptError::Transfer(e.to_string())
    }
}

impl AttemptError {
    fn exhausted(self, index: usize, attempts: u32) -> DownloadError {
        match self {
            AttemptError::Fatal(e) => e,
            AttemptError::Io(e) => DownloadError::Io(e),
            AttemptError::Transfer(reason) => DownloadError::ChunkTransferFailed {
                index,
                attempts,
                reason,
            },
        }
    }
}

/// One contiguous piece of the remote file written to one local file.
struct Segment<'a> {
    index: usize,
    path: &'a Path,
    /// Offset of the first byte in the remote file.
    start: u64,
    /// Expected length, `None` when the total size is unknown.
    size: Option<u64>,
    /// Chunk mode: demand 206 for a closed range.
    strict_range: bool,
}

/// Downloads `chunk` into `part_path`, resuming from whatever the partial
/// file already holds.
pub async fn download_chunk(chunk: Chunk, part_path: PathBuf, ctx: WorkerContext) -> Result<()> {
    let segment = Segment {
        index: chunk.index,
        path: &part_path,
        start: chunk.start,
        size: Some(chunk.size()),
        strict_range: true,
    };
    run_segment(segment, &ctx).await.map(|_| ())
}

/// Downloads the whole file into `destination`, appending to an existing
/// file. `total_size` is 0 when unknown. Returns the final size.
///
/// When `max(resume_from, on-disk size)` already reaches `total_size` the
/// download is reported complete without any request. Otherwise appending
/// continues from the on-disk size.
pub async fn download_stream(
    destination: PathBuf,
    total_size: u64,
    resume_from: u64,
    ctx: WorkerContext,
) -> Result<u64> {
    let on_disk = durable_len(&destination, None).await?;
    if total_size > 0 && resume_from.max(on_disk) >= total_size {
        debug!(resume_from, on_disk, total_size, "stream already complete");
        ctx.progress.add(total_size);
        return Ok(total_size);
    }
    if resume_from > on_disk {
        warn!(
            resume_from,
            on_disk,
            path = %destination.display(),
            "resume offset is beyond data on disk; resuming from on-disk size"
        );
    }

    let segment = Segment {
        index: 0,
        path: &destination,
        start: 0,
        size: (total_size > 0).then_some(total_size),
        strict_range: false,
    };
    run_segment(segment, &ctx).await
}

async fn run_segment(segment: Segment<'_>, ctx: &WorkerContext) -> Result<u64> {
    let mut reported = 0u64;
    let mut attempt = 0u32;

    loop {
        let on_disk = durable_len(segment.path, segment.size).await?;
        reconcile(&ctx.progress, &mut reported, on_disk);

        if segment.size.is_some_and(|size| on_disk >= size) {
            debug!(index = segment.index, on_disk, "segment already complete");
            return Ok(on_disk);
        }

        attempt += 1;
        if attempt > 1 {
            ctx.observer
                .message(format!("Part {}: retry #{}...", segment.index + 1, attempt));
        }

        let mut paused = false;
        match fetch(&segment, on_disk, ctx, &mut reported, &mut paused).await {
            Ok(()) => {
                let len = durable_len(segment.path, segment.size).await?;
                reconcile(&ctx.progress, &mut reported, len);
                return Ok(len);
            }
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(e) => {
                // A long pause can time out the connection; that is not the
                // server's fault and does not spend the retry budget.
                if paused {
                    attempt -= 1;
                }
                if attempt >= ctx.options.max_attempts {
                    error!(index = segment.index, attempt, error = %e, "giving up on segment");
                    return Err(e.exhausted(segment.index, attempt));
                }

                let delay = ctx.options.retry_backoff * attempt.max(1);
                warn!(index = segment.index, attempt, error = %e, ?delay, "segment attempt failed");
                ctx.observer
                    .message(format!("Error: {}. Retrying in {:?}...", e, delay));
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(DownloadError::Cancelled),
                    _ = sleep(delay) => {}
                }
            }
        }
    }
}

/// One attempt: request the remainder from `offset` and append it.
async fn fetch(
    segment: &Segment<'_>,
    offset: u64,
    ctx: &WorkerContext,
    reported: &mut u64,
    paused: &mut bool,
) -> std::result::Result<(), AttemptError> {
    let mut request = ctx.client.get(&ctx.url).headers(ctx.headers.clone());
    if segment.strict_range || offset > 0 {
        let from = segment.start + offset;
        let range = match segment.size {
            Some(size) if segment.strict_range => {
                format!("bytes={}-{}", from, segment.start + size - 1)
            }
            _ => format!("bytes={}-", from),
        };
        request = request.header(RANGE, range);
    }

    let mut response = tokio::select! {
        _ = ctx.cancel.cancelled() => return Err(AttemptError::Fatal(DownloadError::Cancelled)),
        response = request.send() => response?,
    };

    let mut offset = offset;
    let restart = match response.status() {
        StatusCode::PARTIAL_CONTENT => false,
        StatusCode::OK if !segment.strict_range => offset > 0,
        StatusCode::RANGE_NOT_SATISFIABLE if !segment.strict_range && offset > 0 => {
            // Nothing left past our offset.
            return Ok(());
        }
        status => {
            return Err(AttemptError::Transfer(format!(
                "Unexpected status code: {}",
                status
            )));
        }
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(segment.path)
        .await?;

    if restart {
        warn!(path = %segment.path.display(), offset, "server ignored range request; restarting from 0");
        file.set_len(0).await?;
        ctx.progress.rollback(*reported);
        *reported = 0;
        offset = 0;
    }

    let expected = segment.size.map(|size| size - offset);
    let mut writer = BufWriter::with_capacity(ctx.options.transfer_buffer_size, file);
    let mut written = 0u64;

    match pump(ctx, &mut response, &mut writer, expected, &mut written, reported, paused).await {
        Ok(()) => {
            writer.flush().await?;
            if let Some(expected) = expected
                && written < expected
            {
                return Err(AttemptError::Transfer(format!(
                    "connection closed after {} of {} bytes",
                    written, expected
                )));
            }
            Ok(())
        }
        Err(AttemptError::Transfer(reason)) => {
            // Keep whatever arrived intact; the next attempt starts after it.
            let _ = writer.flush().await;
            Err(AttemptError::Transfer(reason))
        }
        Err(e) => Err(e),
    }
}

/// Streams the response body into `writer`, waiting at the pause gate before
/// each buffer and counting it once written.
async fn pump(
    ctx: &WorkerContext,
    response: &mut reqwest::Response,
    writer: &mut BufWriter<File>,
    expected: Option<u64>,
    written: &mut u64,
    reported: &mut u64,
    paused: &mut bool,
) -> std::result::Result<(), AttemptError> {
    loop {
        let next = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(AttemptError::Fatal(DownloadError::Cancelled)),
            next = response.chunk() => next?,
        };
        let Some(mut bytes) = next else {
            return Ok(());
        };

        if let Some(expected) = expected {
            let room = expected - *written;
            if bytes.len() as u64 > room {
                bytes.truncate(room as usize);
            }
        }

        if ctx.gate.wait(&ctx.cancel).await.map_err(AttemptError::Fatal)? {
            *paused = true;
        }
        if let Some(ref limiter) = ctx.limiter {
            limiter.consume(bytes.len()).await;
        }

        writer.write_all(&bytes).await?;
        let len = bytes.len() as u64;
        *written += len;
        *reported += len;
        ctx.progress.add(len);

        if expected.is_some_and(|expected| *written >= expected) {
            return Ok(());
        }
    }
}

/// Length of the file on disk (0 if missing), truncated to `limit` if it
/// somehow grew past it.
async fn durable_len(path: &Path, limit: Option<u64>) -> Result<u64> {
    let len = match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    match limit {
        Some(limit) if len > limit => {
            warn!(path = %path.display(), len, limit, "file larger than its range; truncating");
            let file = OpenOptions::new().write(true).open(path).await?;
            file.set_len(limit).await?;
            Ok(limit)
        }
        _ => Ok(len),
    }
}

/// Brings the shared counter in line with what is durable on disk.
fn reconcile(progress: &ProgressAggregator, reported: &mut u64, durable: u64) {
    if durable > *reported {
        progress.add(durable - *reported);
    } else if durable < *reported {
        progress.rollback(*reported - durable);
    }
    *reported = durable;
}
