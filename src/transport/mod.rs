//! Boundary contract to the blob backend.
//!
//! The engine drives four calls (create, upload-part, finalize, cancel)
//! through the [`BlobTransport`] trait and never talks HTTP itself.
//! Credentials are the transport's concern. Every call may fail with
//! [`UploadError::Aborted`] when its cancellation token trips, or with a
//! network-shaped variant for anything else.
//!
//! [`UploadError::Aborted`]: crate::error::UploadError::Aborted

pub mod http;

pub use http::HttpBlobTransport;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::UploadError;
use crate::upload::store::Part;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one part upload that reached the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOutcome {
    /// 2xx: the backend stored the chunk.
    Accepted,
    /// Non-success status; the part goes to the failed bucket and is
    /// retriable.
    Rejected {
        /// The HTTP status code the backend answered with.
        status: u16,
    },
}

/// Server-side descriptor returned by `finalize`. Opaque to the engine; the
/// UI renders it and the catalog calls list and delete it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobArtifact {
    /// The UID of the persisted blob.
    pub uid: String,
    /// File name the upload was finalized under.
    pub file_name: String,
    /// MIME type the backend sniffed from the file head.
    pub mime_type: String,
    /// When the blob was created.
    pub created_at: DateTime<Utc>,
    /// End of the blob's validity window.
    pub valid_thru: DateTime<Utc>,
}

impl BlobArtifact {
    /// Whether the artifact's validity window is still open.
    pub fn is_valid(&self) -> bool {
        self.valid_thru > Utc::now()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BlobTransport
// ─────────────────────────────────────────────────────────────────────────────

/// The four calls of the multipart upload protocol.
///
/// Implementations attach credentials, normalize failures to
/// [`UploadError`], and surface a tripped token as `Aborted`: a typed
/// discriminator, never a string to compare against.
pub trait BlobTransport: Send + Sync {
    /// Opens an upload session for the bound file; returns the opaque
    /// upload id.
    fn create(&self)
        -> Pin<Box<dyn Future<Output = Result<String, UploadError>> + Send + '_>>;

    /// Uploads the bytes of `part` under `upload_id`. Cancellable through
    /// `token` at any point before the response lands.
    fn upload_part<'a>(
        &'a self,
        part: &'a Part,
        upload_id: &'a str,
        token: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<PartOutcome, UploadError>> + Send + 'a>>;

    /// Assembles the uploaded parts into a persisted blob.
    fn finalize<'a>(
        &'a self,
        file_name: &'a str,
        upload_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<BlobArtifact, UploadError>> + Send + 'a>>;

    /// Discards the upload session server-side. Best-effort; callers log the
    /// outcome and move on.
    fn cancel<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Redacts an opaque id for logging (first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    if id.len() > 8 {
        format!("{}...", &id[..8])
    } else {
        id.to_string()
    }
}
