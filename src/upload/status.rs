//! Observable upload status.
//!
//! The controller publishes `(progress, state, artifact?)` snapshots through
//! a tokio `watch` channel; any number of observers can subscribe and the UI
//! layer fans the snapshots out however it likes.

use serde::Serialize;
use tokio::sync::watch;

use crate::transport::BlobArtifact;

// ─────────────────────────────────────────────────────────────────────────────
// UploadState / UploadStatus
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Created, never started.
    Idle,
    /// Parts are being uploaded.
    Active,
    /// Suspended by `pause` or `abort`; resumable via `start`.
    Paused,
    /// Create, a part, or finalize failed; recoverable via `retry`.
    Failed,
    /// Finalized; the artifact is published. Terminal.
    Done,
}

/// Snapshot published to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct UploadStatus {
    /// Percent of file bytes uploaded, in `[0, 100]`.
    pub progress: f64,
    /// Current coarse state.
    pub state: UploadState,
    /// The backend's descriptor, present once the upload is done.
    pub artifact: Option<BlobArtifact>,
}

// ─────────────────────────────────────────────────────────────────────────────
// StatusFeed
// ─────────────────────────────────────────────────────────────────────────────

/// Publisher half of the status projection, owned by the controller.
pub(crate) struct StatusFeed {
    tx: watch::Sender<UploadStatus>,
}

impl StatusFeed {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(UploadStatus {
            progress: 0.0,
            state: UploadState::Idle,
            artifact: None,
        });
        Self { tx }
    }

    /// Returns a receiver that observes every subsequent snapshot.
    pub(crate) fn subscribe(&self) -> watch::Receiver<UploadStatus> {
        self.tx.subscribe()
    }

    /// The latest published snapshot.
    pub(crate) fn snapshot(&self) -> UploadStatus {
        self.tx.borrow().clone()
    }

    /// The latest published state.
    pub(crate) fn state(&self) -> UploadState {
        self.tx.borrow().state
    }

    pub(crate) fn set_state(&self, state: UploadState) {
        self.tx.send_modify(|status| status.state = state);
    }

    pub(crate) fn set_progress(&self, progress: f64) {
        self.tx.send_modify(|status| status.progress = progress.clamp(0.0, 100.0));
    }

    /// Publishes the terminal `Done` snapshot with the persisted artifact.
    pub(crate) fn complete(&self, artifact: BlobArtifact) {
        self.tx.send_modify(|status| {
            status.progress = 100.0;
            status.state = UploadState::Done;
            status.artifact = Some(artifact);
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
