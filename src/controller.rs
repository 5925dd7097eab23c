//! Orchestrates one download: probe, plan, workers, merge.
use crate::config::DownloadOptions;
use crate::error::{DownloadError, Result};
use crate::gate::PauseGate;
use crate::job::DownloadJob;
use crate::manifest::{self, Manifest};
use crate::merger;
use crate::observer::ProgressObserver;
use crate::planner::{self, ChunkPlan};
use crate::probe;
use crate::progress::ProgressAggregator;
use crate::state::{DownloadState, StateCell};
use crate::worker::{self, ByteRateLimiter, WorkerContext};
use futures_util::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Drives a single [`DownloadJob`] to completion.
///
/// Cloning is cheap and every clone controls the same job, so one clone can
/// `start()` while another pauses, resumes or cancels.
#[derive(Clone)]
pub struct DownloadController {
    job: Arc<DownloadJob>,
    options: DownloadOptions,
    client: reqwest::Client,
    observer: Arc<dyn ProgressObserver>,
    state: Arc<StateCell>,
    gate: PauseGate,
    cancel: CancellationToken,
}

impl DownloadController {
    pub fn new(
        job: DownloadJob,
        options: DownloadOptions,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<Self> {
        let client = options
            .build_client()
            .map_err(|e| DownloadError::InvalidJob(format!("http client: {}", e)))?;
        Ok(Self::with_client(job, options, client, observer))
    }

    pub fn with_client(
        job: DownloadJob,
        options: DownloadOptions,
        client: reqwest::Client,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        Self {
            job: Arc::new(job),
            options,
            client,
            observer,
            state: Arc::new(StateCell::default()),
            gate: PauseGate::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn job(&self) -> &DownloadJob {
        &self.job
    }

    pub fn state(&self) -> DownloadState {
        self.state.get()
    }

    /// Workers stop at their next buffer write. Takes effect immediately
    /// and does not wait for them. No-op unless downloading.
    pub fn pause(&self) {
        if self.state.transition_then(
            &[DownloadState::Downloading],
            DownloadState::Paused,
            || self.gate.pause(),
        ) {
            info!(file = %self.job.filename, "download paused");
        }
    }

    /// No-op unless paused.
    pub fn resume(&self) {
        if self.state.transition_then(
            &[DownloadState::Paused],
            DownloadState::Downloading,
            || self.gate.resume(),
        ) {
            info!(file = %self.job.filename, "download resumed");
        }
    }

    /// Stops every worker at its next check. Partial files are kept so a
    /// later job for the same destination can resume.
    pub fn cancel(&self) {
        if !self.state().is_terminal() {
            self.cancel.cancel();
        }
    }

    /// Runs the job. Returns the final size of the file on success.
    ///
    /// Exactly one of `on_complete` / `on_error` is delivered to the observer.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the job was already started; otherwise the error that
    /// moved the job to the `error` state.
    pub async fn start(&self) -> Result<u64> {
        if !self
            .state
            .transition(&[DownloadState::Pending], DownloadState::Downloading)
        {
            return Err(DownloadError::InvalidState);
        }
        info!(url = %self.job.url, dest = %self.job.destination().display(), "download started");

        let result = self.run().await;
        match &result {
            Ok(size) => {
                if self.state.finish(DownloadState::Completed) {
                    info!(file = %self.job.filename, size, "download completed");
                    self.observer.on_complete(*size);
                }
            }
            Err(e) => {
                error!(file = %self.job.filename, error = %e, "download failed");
                if self.state.finish(DownloadState::Error) {
                    self.observer.on_error(e);
                }
            }
        }
        result
    }

    async fn run(&self) -> Result<u64> {
        let job = &self.job;
        job.validate()?;
        let headers = job.request_headers()?;
        tokio::fs::create_dir_all(&job.dest_dir).await?;

        let probed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
            probed = probe::probe(&self.client, &job.url, &headers, self.options.probe_timeout) => probed?,
        };

        let plan = if probed.accepts_ranges && probed.total_size > 0 {
            self.resolve_plan(probed.total_size).await?
        } else {
            Vec::new()
        };

        let progress = Arc::new(ProgressAggregator::new(
            probed.total_size,
            self.observer.clone(),
        ));
        let ctx = WorkerContext {
            client: self.client.clone(),
            url: job.url.clone(),
            headers,
            progress: progress.clone(),
            observer: self.observer.clone(),
            gate: self.gate.clone(),
            cancel: self.cancel.child_token(),
            limiter: self.options.rate_limit.and_then(ByteRateLimiter::per_second),
            options: self.options.clone(),
        };

        let size = if plan.len() > 1 {
            self.run_chunks(&plan, probed.total_size, ctx).await?
        } else {
            self.run_single(probed.total_size, ctx).await?
        };

        progress.finish(size);
        Ok(size)
    }

    /// Reuses the saved plan when it describes the same file, otherwise
    /// plans afresh and drops partial files left by a different plan.
    async fn resolve_plan(&self, total_size: u64) -> Result<ChunkPlan> {
        let job = &self.job;
        let manifest_path = job.manifest_path();

        if let Some(saved) = manifest::load(&manifest_path).await {
            if saved.matches(&job.url, total_size) {
                debug!(chunks = saved.chunks.len(), "resuming with saved plan");
                return Ok(saved.chunks);
            }
            warn!(file = %job.filename, "saved plan does not match remote file; discarding partial files");
            for chunk in &saved.chunks {
                remove_if_exists(&job.part_path(chunk.index)).await;
            }
            remove_if_exists(&manifest_path).await;
        }

        let plan = planner::plan_chunks(total_size, job.concurrency);
        debug!(total_size, chunks = plan.len(), "planned download");
        if plan.len() > 1 {
            manifest::save(&Manifest::new(&job.url, total_size, plan.clone()), &manifest_path).await?;
        }
        Ok(plan)
    }

    async fn run_chunks(&self, plan: &ChunkPlan, total_size: u64, ctx: WorkerContext) -> Result<u64> {
        let job = &self.job;
        let mut tasks = Vec::new();

        for chunk in plan.iter().copied() {
            let path = job.part_path(chunk.index);
            let ctx = ctx.clone();
            tasks.push(tokio::spawn(async move {
                let siblings = ctx.cancel.clone();
                let result = worker::download_chunk(chunk, path, ctx).await;
                if result.is_err() {
                    // One failed chunk fails the job; stop the rest.
                    siblings.cancel();
                }
                result
            }));
        }

        let mut failure: Option<DownloadError> = None;
        for result in join_all(tasks).await {
            let result = result.map_err(|e| DownloadError::Io(std::io::Error::other(e)))?;
            if let Err(e) = result {
                let replace = match failure {
                    None => true,
                    Some(DownloadError::Cancelled) => !matches!(e, DownloadError::Cancelled),
                    Some(_) => false,
                };
                if replace {
                    failure = Some(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let parts: Vec<PathBuf> = plan.iter().map(|c| job.part_path(c.index)).collect();
        let size = merger::merge_parts(
            &parts,
            &job.destination(),
            total_size,
            self.options.merge_buffer_size,
        )
        .await?;

        remove_if_exists(&job.manifest_path()).await;
        Ok(size)
    }

    async fn run_single(&self, total_size: u64, ctx: WorkerContext) -> Result<u64> {
        let size = worker::download_stream(
            self.job.destination(),
            total_size,
            self.job.resume_from,
            ctx,
        )
        .await?;

        if total_size > 0 && size != total_size {
            return Err(DownloadError::ChunkTransferFailed {
                index: 0,
                attempts: self.options.max_attempts,
                reason: format!("received {} of {} bytes", size, total_size),
            });
        }
        Ok(size)
    }
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;

    fn controller() -> DownloadController {
        let job = DownloadJob::new("http://127.0.0.1:9/file.bin", ".", "file.bin");
        DownloadController::new(job, DownloadOptions::default(), Arc::new(NoopObserver)).unwrap()
    }

    #[test]
    fn pause_and_resume_are_noops_before_start() {
        let c = controller();
        c.pause();
        assert_eq!(c.state(), DownloadState::Pending);
        c.resume();
        assert_eq!(c.state(), DownloadState::Pending);
        assert!(!c.gate.is_paused());
    }

    #[test]
    fn pause_closes_gate_and_resume_opens_it() {
        let c = controller();
        assert!(c.state.transition(&[DownloadState::Pending], DownloadState::Downloading));

        c.pause();
        assert_eq!(c.state(), DownloadState::Paused);
        assert!(c.gate.is_paused());

        c.resume();
        assert_eq!(c.state(), DownloadState::Downloading);
        assert!(!c.gate.is_paused());
    }

    #[test]
    fn terminal_jobs_ignore_pause() {
        let c = controller();
        assert!(c.state.transition(&[DownloadState::Pending], DownloadState::Downloading));
        assert!(c.state.finish(DownloadState::Completed));

        c.pause();
        c.cancel();
        assert_eq!(c.state(), DownloadState::Completed);
        assert!(!c.gate.is_paused());
        assert!(!c.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn invalid_url_fails_without_io() {
        let job = DownloadJob::new("not a url", ".", "x");
        let c = DownloadController::new(job, DownloadOptions::default(), Arc::new(NoopObserver)).unwrap();
        let err = c.start().await.unwrap_err();
        assert!(matches!(err, DownloadError::InvalidJob(_)));
        assert_eq!(c.state(), DownloadState::Error);
        assert!(matches!(c.start().await, Err(DownloadError::InvalidState)));
    }
}
