use thiserror::Error;

/// Application-wide error type for the upload engine.
///
/// Part-level failures never cross the controller's public surface; they are
/// absorbed into the part store and reflected in the observable status.
/// Values of this type reach callers only from transport construction, the
/// catalog calls, and configuration loading.
#[derive(Debug, Error)]
pub enum UploadError {
    // ── Cancellation ──────────────────────────────────────────────────────────
    /// The cancellation token governing this call was tripped.
    #[error("request aborted")]
    Aborted,

    // ── Transport ─────────────────────────────────────────────────────────────
    /// Network failure or a non-success HTTP response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// `create` did not yield an upload id.
    #[error("upload session could not be created: {0}")]
    Create(String),

    /// `finalize` was rejected or returned no artifact.
    #[error("upload could not be finalized: {0}")]
    Finalize(String),

    /// The file is below the minimum size the backend accepts.
    #[error("file is {size} bytes, below the {min}-byte minimum")]
    FileTooSmall { size: u64, min: u64 },

    // ── Configuration ─────────────────────────────────────────────────────────
    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    // ── Programmer errors ─────────────────────────────────────────────────────
    /// Broken internal invariant; unrecoverable.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl UploadError {
    /// Whether this error came from a tripped cancellation token.
    ///
    /// The part-job factory uses this to discriminate an expected abort from a
    /// transport failure without inspecting message strings.
    pub fn is_aborted(&self) -> bool {
        matches!(self, UploadError::Aborted)
    }
}
