//! Sinks for progress and terminal events.
use crate::error::{DownloadError, ErrorKind};
use crate::progress::ProgressEvent;
use indicatif::{HumanBytes, ProgressBar};
use tokio::sync::mpsc::UnboundedSender;

/// Receives progress updates from a running job.
///
/// Exactly one of `on_complete` / `on_error` is called per started job.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
    /// Human-facing status text, e.g. retry notices.
    fn message(&self, _msg: String) {}
    fn on_complete(&self, _final_size: u64) {}
    fn on_error(&self, _error: &DownloadError) {}
}

/// Discards everything.
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Events delivered through a [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Progress(ProgressEvent),
    Message(String),
    Completed { final_size: u64 },
    Failed { kind: ErrorKind, message: String },
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadEvent::Completed { .. } | DownloadEvent::Failed { .. })
    }
}

/// Forwards every event onto an unbounded channel. Send errors (receiver
/// dropped) are ignored.
pub struct ChannelObserver {
    pub tx: UnboundedSender<DownloadEvent>,
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        let _ = self.tx.send(DownloadEvent::Progress(*event));
    }

    fn message(&self, msg: String) {
        let _ = self.tx.send(DownloadEvent::Message(msg));
    }

    fn on_complete(&self, final_size: u64) {
        let _ = self.tx.send(DownloadEvent::Completed { final_size });
    }

    fn on_error(&self, error: &DownloadError) {
        let _ = self.tx.send(DownloadEvent::Failed {
            kind: error.kind(),
            message: error.to_string(),
        });
    }
}

/// Renders progress on a terminal bar.
pub struct ConsoleObserver {
    pub pb: ProgressBar,
}

impl ProgressObserver for ConsoleObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        if event.total_bytes > 0 {
            self.pb.set_length(event.total_bytes);
        }
        self.pb.set_position(event.bytes_done);
        self.pb
            .set_message(format!("{}/s", HumanBytes(event.speed_bytes_per_sec as u64)));
    }

    fn message(&self, msg: String) {
        self.pb.set_message(msg);
    }

    fn on_complete(&self, final_size: u64) {
        self.pb.set_length(final_size);
        self.pb.set_position(final_size);
        self.pb.finish_with_message("Done!");
    }

    fn on_error(&self, error: &DownloadError) {
        self.pb.abandon_with_message(format!("Failed: {}", error));
    }
}
