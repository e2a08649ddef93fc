//! Per-file upload controller.
//!
//! One [`UploadController`] drives one file through the multipart protocol:
//! it lazily obtains the upload id, drains the part store into the shared
//! job queue, owns a cancellation token per in-flight part, and exposes the
//! `start` / `pause` / `retry` / `abort` state machine. Failures are absorbed
//! into the observable status; the public surface does not return errors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::transport::{redact_id, BlobTransport};
use crate::upload::job::part_job;
use crate::upload::queue::JobQueue;
use crate::upload::status::{StatusFeed, UploadState, UploadStatus};
use crate::upload::store::PartStore;

// ─────────────────────────────────────────────────────────────────────────────
// ControllerCore
// ─────────────────────────────────────────────────────────────────────────────

/// State shared between the controller facade and its part jobs.
///
/// Jobs capture this by `Arc` but never outlive the upload: the queue drains
/// naturally and late completions are defused by the store's no-op rule.
pub(crate) struct ControllerCore {
    pub(crate) file_name: String,
    pub(crate) file_size: u64,
    part_size: u64,
    pub(crate) transport: Arc<dyn BlobTransport>,
    queue: JobQueue,
    pub(crate) store: PartStore,
    upload_id: Mutex<Option<String>>,
    /// One token per in-flight part, keyed by part index.
    tokens: Mutex<HashMap<u32, CancellationToken>>,
    /// Guards finalization so concurrent quiescence observers attempt it once.
    finalizing: AtomicBool,
    feed: StatusFeed,
}

impl ControllerCore {
    pub(crate) fn upload_id(&self) -> Option<String> {
        self.upload_id.lock().expect("upload id lock poisoned").clone()
    }

    fn set_upload_id(&self, id: String) {
        *self.upload_id.lock().expect("upload id lock poisoned") = Some(id);
    }

    fn insert_token(&self, index: u32, token: CancellationToken) {
        self.tokens
            .lock()
            .expect("token set lock poisoned")
            .insert(index, token);
    }

    pub(crate) fn drop_token(&self, index: u32) {
        self.tokens
            .lock()
            .expect("token set lock poisoned")
            .remove(&index);
    }

    /// Trips and discards every outstanding token.
    fn trip_all_tokens(&self) {
        let drained: Vec<CancellationToken> = {
            let mut tokens = self.tokens.lock().expect("token set lock poisoned");
            tokens.drain().map(|(_, token)| token).collect()
        };
        for token in drained {
            token.cancel();
        }
    }

    fn clear_tokens(&self) {
        self.tokens.lock().expect("token set lock poisoned").clear();
    }

    fn state(&self) -> UploadState {
        self.feed.state()
    }

    pub(crate) async fn publish_progress(&self) {
        let done = self.store.done_bytes().await;
        let progress = if self.file_size == 0 {
            100.0
        } else {
            done as f64 * 100.0 / self.file_size as f64
        };
        self.feed.set_progress(progress);
    }

    /// Obtains the upload id if missing, initializes the store, and drains it
    /// into the queue with fresh tokens.
    async fn start_inner(self: &Arc<Self>) {
        if self.upload_id().is_none() {
            match self.transport.create().await {
                Ok(id) => {
                    info!(
                        "[UPLOAD] created upload {} for {}",
                        redact_id(&id),
                        self.file_name
                    );
                    self.set_upload_id(id);
                }
                Err(err) => {
                    warn!("[UPLOAD] create failed for {}: {}", self.file_name, err);
                    self.feed.set_state(UploadState::Failed);
                    return;
                }
            }
        }

        self.store.init(self.file_size, self.part_size).await;
        self.feed.set_state(UploadState::Active);
        self.drain().await;
    }

    async fn drain(self: &Arc<Self>) {
        while let Some(part) = self.store.next_part().await {
            let token = CancellationToken::new();
            self.insert_token(part.index(), token.clone());
            self.queue.enqueue(part_job(Arc::clone(self), part, token));
        }
    }

    /// Trips every token and returns the on-duty parts to the send queue.
    /// Resolves only once the store is quiescent; responses still in flight
    /// are defused by the store's no-op rule.
    async fn pause_inner(&self) {
        self.trip_all_tokens();
        self.store.pause().await;
    }

    /// Finalization hook, run by the job whose update left the store fully
    /// drained. Internally driven: only an active upload finalizes, and only
    /// one observer attempts it.
    pub(crate) async fn try_finalize(self: &Arc<Self>) {
        if self.state() != UploadState::Active {
            return;
        }
        if self
            .finalizing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let done = self.store.done_bytes().await;
        if done == self.file_size {
            self.finalize_now().await;
        } else {
            warn!(
                "[UPLOAD] {} stalled at {} of {} bytes with {} failed part(s)",
                self.file_name,
                done,
                self.file_size,
                self.store.failed_parts().await
            );
            self.feed.set_state(UploadState::Failed);
        }

        self.clear_tokens();
        self.finalizing.store(false, Ordering::SeqCst);
    }

    /// Calls `finalize` and publishes the terminal outcome.
    async fn finalize_now(&self) {
        let Some(upload_id) = self.upload_id() else {
            // Unreachable once any part passed; create assigns the id first.
            self.feed.set_state(UploadState::Failed);
            return;
        };

        match self.transport.finalize(&self.file_name, &upload_id).await {
            Ok(artifact) => {
                info!(
                    "[UPLOAD] upload {} finalized as blob {}",
                    redact_id(&upload_id),
                    redact_id(&artifact.uid)
                );
                self.feed.complete(artifact);
            }
            Err(err) => {
                warn!(
                    "[UPLOAD] finalize of upload {} failed: {}",
                    redact_id(&upload_id),
                    err
                );
                self.feed.set_state(UploadState::Failed);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// UploadController
// ─────────────────────────────────────────────────────────────────────────────

/// Facade over one file's upload.
///
/// The four operations are serialized with respect to each other: each fully
/// resolves before the next begins. All of them are no-ops once the upload
/// is `Done`.
pub struct UploadController {
    core: Arc<ControllerCore>,
    /// Serializes `start` / `pause` / `retry` / `abort`.
    ops: tokio::sync::Mutex<()>,
}

impl UploadController {
    /// Creates an idle controller for one file.
    ///
    /// `queue` is shared across all uploads in the process and bounds their
    /// combined part concurrency.
    ///
    /// # Panics
    ///
    /// Panics if `part_size` is zero.
    pub fn new(
        transport: Arc<dyn BlobTransport>,
        queue: JobQueue,
        file_name: impl Into<String>,
        file_size: u64,
        part_size: u64,
    ) -> Self {
        assert!(part_size > 0, "part size must be positive");

        Self {
            core: Arc::new(ControllerCore {
                file_name: file_name.into(),
                file_size,
                part_size,
                transport,
                queue,
                store: PartStore::new(),
                upload_id: Mutex::new(None),
                tokens: Mutex::new(HashMap::new()),
                finalizing: AtomicBool::new(false),
                feed: StatusFeed::new(),
            }),
            ops: tokio::sync::Mutex::new(()),
        }
    }

    /// Name of the file this controller uploads.
    pub fn file_name(&self) -> &str {
        &self.core.file_name
    }

    /// Size of the file this controller uploads.
    pub fn file_size(&self) -> u64 {
        self.core.file_size
    }

    /// Subscribes to `(progress, state, artifact?)` snapshots.
    pub fn subscribe(&self) -> watch::Receiver<UploadStatus> {
        self.core.feed.subscribe()
    }

    /// The latest status snapshot.
    pub fn status(&self) -> UploadStatus {
        self.core.feed.snapshot()
    }

    /// Begins or resumes the upload.
    ///
    /// On first call this obtains the upload id via `create` (a failure moves
    /// the controller to `Failed` with no parts attempted, recoverable by
    /// calling `start` again). Once the id is assigned, `start` only drains
    /// whatever the store has waiting, so re-invocation is idempotent; a
    /// failure after parts were attempted is recovered through [`retry`],
    /// which re-queues the failed bucket first.
    ///
    /// [`retry`]: UploadController::retry
    pub async fn start(&self) {
        let _op = self.ops.lock().await;
        match self.core.state() {
            UploadState::Done => return,
            // Part and finalize failures recover through `retry`; only a
            // failed `create` leaves nothing behind for `start` to redo.
            UploadState::Failed if self.core.upload_id().is_some() => return,
            _ => {}
        }
        self.core.start_inner().await;
    }

    /// Suspends the upload, recoverably.
    ///
    /// Trips every outstanding token and waits until the store has returned
    /// all on-duty parts to the send queue. After `pause` resolves, no racing
    /// transport response can move the byte count.
    pub async fn pause(&self) {
        let _op = self.ops.lock().await;
        if self.core.state() != UploadState::Active {
            return;
        }
        self.core.pause_inner().await;
        self.core.feed.set_state(UploadState::Paused);
        info!("[UPLOAD] {} paused", self.core.file_name);
    }

    /// Recovers a failed upload.
    ///
    /// Re-queues failed parts and resumes uploading; when every byte already
    /// passed (finalize itself failed), only finalization is retried.
    pub async fn retry(&self) {
        let _op = self.ops.lock().await;
        if self.core.state() != UploadState::Failed {
            return;
        }

        if self.core.store.done_bytes().await < self.core.file_size {
            self.core.store.retry().await;
            self.core.start_inner().await;
        } else {
            self.core.feed.set_state(UploadState::Active);
            self.core.finalize_now().await;
        }
    }

    /// Abandons the upload: suspends like `pause`, then discards the backend
    /// session. The cancel call's outcome is logged and otherwise ignored;
    /// the controller stays `Paused` regardless.
    pub async fn abort(&self) {
        let _op = self.ops.lock().await;
        if self.core.state() == UploadState::Done {
            return;
        }

        self.core.pause_inner().await;
        self.core.feed.set_state(UploadState::Paused);

        if let Some(upload_id) = self.core.upload_id() {
            match self.core.transport.cancel(&upload_id).await {
                Ok(()) => info!("[UPLOAD] upload {} cancelled", redact_id(&upload_id)),
                Err(err) => warn!(
                    "[UPLOAD] cancel of upload {} failed: {}",
                    redact_id(&upload_id),
                    err
                ),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
