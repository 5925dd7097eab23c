//! Pause gate shared by the workers of one job.
use crate::error::{DownloadError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Open by default. While closed, [`PauseGate::wait`] parks the caller
/// without spinning until the gate is reopened or the job is cancelled.
#[derive(Clone, Debug)]
pub struct PauseGate {
    paused: Arc<watch::Sender<bool>>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            paused: Arc::new(tx),
        }
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Returns `Ok(true)` if the caller actually had to wait.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` as soon as `cancel` fires, paused or not.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let mut rx = self.paused.subscribe();
        if !*rx.borrow_and_update() {
            return Ok(false);
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(DownloadError::Cancelled),
            opened = rx.wait_for(|paused| !*paused) => {
                opened.map_err(|_| DownloadError::Cancelled)?;
                Ok(true)
            }
        }
    }
}
