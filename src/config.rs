//! Transport configuration.
//!
//! The engine core reads no environment variables itself; only the transport
//! is configured here, either explicitly or via [`TransportConfig::from_env`].

use secrecy::SecretString;
use url::Url;

use crate::error::UploadError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Environment variable naming the backend base URL.
pub const BASE_URL_ENV: &str = "HIRESIFY_BASE_URL";

/// Environment variable carrying the access-token credential.
pub const ACCESS_TOKEN_ENV: &str = "HIRESIFY_ACCESS_TOKEN";

/// Default part size: 1 MiB.
pub const DEFAULT_PART_SIZE: u64 = 1024 * 1024;

/// Default bound on concurrently running part uploads.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default minimum file size accepted at `create`. The backend sniffs the
/// first 4096 bytes of the file for its MIME type.
pub const DEFAULT_MIN_FILE_SIZE: u64 = 4096;

// ─────────────────────────────────────────────────────────────────────────────
// TransportConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Connection settings for the blob backend.
///
/// The access token is wrapped in [`SecretString`] so it cannot leak through
/// `Debug` output or logging.
#[derive(Clone)]
pub struct TransportConfig {
    /// Base URL of the backend, e.g. `https://api.example.com/`.
    pub base_url: Url,
    /// Credential attached to every request as the `access_token` cookie.
    pub access_token: SecretString,
    /// Fixed size of every part except possibly the last.
    pub part_size: u64,
    /// Upper bound on part uploads in flight across the process.
    pub concurrency: usize,
    /// Files below this size are rejected client-side at `create`.
    pub min_file_size: u64,
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("base_url", &self.base_url.as_str())
            .field("access_token", &"[REDACTED]")
            .field("part_size", &self.part_size)
            .field("concurrency", &self.concurrency)
            .field("min_file_size", &self.min_file_size)
            .finish()
    }
}

impl TransportConfig {
    /// Creates a config with the given endpoint and credential, using the
    /// default part size, concurrency, and minimum file size.
    pub fn new(base_url: Url, access_token: impl Into<String>) -> Self {
        Self {
            base_url,
            access_token: SecretString::from(access_token.into()),
            part_size: DEFAULT_PART_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            min_file_size: DEFAULT_MIN_FILE_SIZE,
        }
    }

    /// Builds a config from `HIRESIFY_BASE_URL` and `HIRESIFY_ACCESS_TOKEN`.
    pub fn from_env() -> Result<Self, UploadError> {
        let base_url = std::env::var(BASE_URL_ENV)
            .map_err(|_| UploadError::Config(format!("{BASE_URL_ENV} is not set")))?;
        let base_url = Url::parse(&base_url)
            .map_err(|e| UploadError::Config(format!("{BASE_URL_ENV} is not a valid URL: {e}")))?;
        let access_token = std::env::var(ACCESS_TOKEN_ENV)
            .map_err(|_| UploadError::Config(format!("{ACCESS_TOKEN_ENV} is not set")))?;

        Ok(Self::new(base_url, access_token))
    }

    /// Sets the part size.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is zero.
    pub fn part_size(mut self, bytes: u64) -> Self {
        assert!(bytes > 0, "part size must be positive");
        self.part_size = bytes;
        self
    }

    /// Sets the concurrency bound.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is zero.
    pub fn concurrency(mut self, limit: usize) -> Self {
        assert!(limit >= 1, "concurrency must be at least 1");
        self.concurrency = limit;
        self
    }

    /// Sets the minimum file size enforced at `create`.
    pub fn min_file_size(mut self, bytes: u64) -> Self {
        self.min_file_size = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://api.example.com/").unwrap()
    }

    #[test]
    fn new_applies_defaults() {
        let config = TransportConfig::new(base(), "token");
        assert_eq!(config.part_size, DEFAULT_PART_SIZE);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.min_file_size, DEFAULT_MIN_FILE_SIZE);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = TransportConfig::new(base(), "token")
            .part_size(64 * 1024)
            .concurrency(8)
            .min_file_size(0);
        assert_eq!(config.part_size, 64 * 1024);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.min_file_size, 0);
    }

    #[test]
    #[should_panic(expected = "part size must be positive")]
    fn zero_part_size_panics() {
        let _ = TransportConfig::new(base(), "token").part_size(0);
    }

    #[test]
    #[should_panic(expected = "concurrency must be at least 1")]
    fn zero_concurrency_panics() {
        let _ = TransportConfig::new(base(), "token").concurrency(0);
    }

    #[test]
    fn debug_never_prints_the_token() {
        let config = TransportConfig::new(base(), "super-secret-token");
        let printed = format!("{config:?}");
        assert!(!printed.contains("super-secret-token"));
        assert!(printed.contains("[REDACTED]"));
    }
}
