//! Lifecycle of a download job.
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// `pending -> downloading -> {paused <-> downloading} -> {completed | error}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Pending,
    Downloading,
    Paused,
    Completed,
    Error,
}

impl DownloadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadState::Completed | DownloadState::Error)
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadState::Pending => "pending",
            DownloadState::Downloading => "downloading",
            DownloadState::Paused => "paused",
            DownloadState::Completed => "completed",
            DownloadState::Error => "error",
        };
        f.write_str(s)
    }
}

/// A state guarded for concurrent transitions.
#[derive(Debug)]
pub struct StateCell {
    state: Mutex<DownloadState>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self {
            state: Mutex::new(DownloadState::Pending),
        }
    }
}

impl StateCell {
    pub fn get(&self) -> DownloadState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `to` if the current state is one of `from`.
    pub fn transition(&self, from: &[DownloadState], to: DownloadState) -> bool {
        self.transition_then(from, to, || {})
    }

    /// Like [`StateCell::transition`], running `on_change` under the same
    /// lock when the transition happens.
    pub fn transition_then(
        &self,
        from: &[DownloadState],
        to: DownloadState,
        on_change: impl FnOnce(),
    ) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if from.contains(&*state) {
            *state = to;
            on_change();
            true
        } else {
            false
        }
    }

    /// Moves to a terminal state unless one was already reached.
    pub fn finish(&self, to: DownloadState) -> bool {
        self.transition(
            &[
                DownloadState::Pending,
                DownloadState::Downloading,
                DownloadState::Paused,
            ],
            to,
        )
    }
}
