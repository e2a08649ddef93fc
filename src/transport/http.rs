//! HTTP implementation of the blob transport.
//!
//! Speaks the backend's multipart protocol over `reqwest`:
//!
//! - `POST /blob/upload` - create a session (streams the whole file)
//! - `PATCH /blob/upload/{index}` - upload one chunk
//! - `PUT /blob/upload` - finalize into a persisted blob
//! - `DELETE /blob/upload` - discard a session
//!
//! plus the catalog calls `GET /blob/fetch` and `DELETE /blob/delete`, which
//! the engine core never invokes but the UI layer does.
//!
//! # Security
//!
//! - The access token is attached as a cookie and never logged
//! - Upload ids are logged as an 8-char prefix
//! - Raw file bytes are never logged

use std::future::Future;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::pin::Pin;

use reqwest::header::COOKIE;
use reqwest::multipart;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::config::TransportConfig;
use crate::error::UploadError;
use crate::transport::{redact_id, BlobArtifact, BlobTransport, PartOutcome};
use crate::upload::store::Part;

/// Cookie under which the backend expects the credential.
const ACCESS_TOKEN_COOKIE: &str = "access_token";

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Backend error response format.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// HttpBlobTransport
// ─────────────────────────────────────────────────────────────────────────────

/// Transport bound to one local file and one backend.
///
/// Chunk reads open the file per call, so concurrent part uploads never
/// contend on a shared file handle.
pub struct HttpBlobTransport {
    http: Client,
    config: TransportConfig,
    file_path: PathBuf,
    file_name: String,
    file_size: u64,
}

impl HttpBlobTransport {
    /// Binds `path` to the backend described by `config`, reading the file
    /// size from disk.
    pub async fn open(
        config: TransportConfig,
        path: impl Into<PathBuf>,
    ) -> Result<Self, UploadError> {
        let file_path = path.into();
        let metadata = tokio::fs::metadata(&file_path)
            .await
            .map_err(|e| UploadError::Transport(format!("failed to stat source file: {e}")))?;

        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "blob".to_string());

        Ok(Self {
            http: Client::new(),
            config,
            file_path,
            file_name,
            file_size: metadata.len(),
        })
    }

    /// Size of the bound file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Name of the bound file.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Part size the transport was configured with.
    pub fn part_size(&self) -> u64 {
        self.config.part_size
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Protocol Calls
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_impl(&self) -> Result<String, UploadError> {
        if self.file_size < self.config.min_file_size {
            return Err(UploadError::FileTooSmall {
                size: self.file_size,
                min: self.config.min_file_size,
            });
        }

        let url = self.endpoint("blob/upload")?;

        let file = tokio::fs::File::open(&self.file_path)
            .await
            .map_err(|e| UploadError::Create(format!("failed to open source file: {e}")))?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let form = multipart::Form::new().part(
            "file",
            multipart::Part::stream_with_length(body, self.file_size)
                .file_name(self.file_name.clone()),
        );

        info!("[TRANSPORT] POST /blob/upload ({} bytes)", self.file_size);

        let response = self
            .http
            .post(url)
            .header(COOKIE, self.cookie_header())
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Create(format!("create call failed: {e}")))?;

        let status = response.status();
        info!("[TRANSPORT] POST /blob/upload -> {}", status.as_u16());

        if !status.is_success() {
            return Err(UploadError::Create(error_detail(response, status).await));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UploadError::Create(format!("failed to read upload id: {e}")))?;

        // The body is the upload id, JSON-encoded when the backend frames
        // plain strings as JSON.
        let upload_id = serde_json::from_str::<String>(&body)
            .unwrap_or_else(|_| body.trim().to_string());
        if upload_id.is_empty() {
            return Err(UploadError::Create("backend returned an empty upload id".into()));
        }

        Ok(upload_id)
    }

    async fn upload_part_impl(
        &self,
        part: &Part,
        upload_id: &str,
        token: &CancellationToken,
    ) -> Result<PartOutcome, UploadError> {
        let url = self.endpoint(&format!("blob/upload/{}", part.index()))?;
        let chunk = self.read_chunk(part).await?;

        let form = multipart::Form::new()
            .part("file", multipart::Part::bytes(chunk).file_name(self.file_name.clone()))
            .text("upload_id", upload_id.to_string());

        info!(
            "[TRANSPORT] PATCH /blob/upload/{} ({} bytes, upload {})",
            part.index(),
            part.len(),
            redact_id(upload_id)
        );

        let request = self
            .http
            .patch(url)
            .header(COOKIE, self.cookie_header())
            .multipart(form)
            .send();

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(UploadError::Aborted),
            result = request => result.map_err(|e| {
                UploadError::Transport(format!("part {} upload failed: {e}", part.index()))
            })?,
        };

        let status = response.status();
        info!(
            "[TRANSPORT] PATCH /blob/upload/{} -> {}",
            part.index(),
            status.as_u16()
        );

        if status.is_success() {
            Ok(PartOutcome::Accepted)
        } else {
            Ok(PartOutcome::Rejected {
                status: status.as_u16(),
            })
        }
    }

    async fn finalize_impl(
        &self,
        file_name: &str,
        upload_id: &str,
    ) -> Result<BlobArtifact, UploadError> {
        let url = self.endpoint("blob/upload")?;

        info!(
            "[TRANSPORT] PUT /blob/upload (upload {})",
            redact_id(upload_id)
        );

        let response = self
            .http
            .put(url)
            .header(COOKIE, self.cookie_header())
            .form(&[("file_name", file_name), ("upload_id", upload_id)])
            .send()
            .await
            .map_err(|e| UploadError::Finalize(format!("finalize call failed: {e}")))?;

        let status = response.status();
        info!("[TRANSPORT] PUT /blob/upload -> {}", status.as_u16());

        if !status.is_success() {
            return Err(UploadError::Finalize(error_detail(response, status).await));
        }

        response
            .json::<BlobArtifact>()
            .await
            .map_err(|e| UploadError::Finalize(format!("failed to parse artifact: {e}")))
    }

    async fn cancel_impl(&self, upload_id: &str) -> Result<(), UploadError> {
        let url = self.endpoint("blob/upload")?;

        info!(
            "[TRANSPORT] DELETE /blob/upload (upload {})",
            redact_id(upload_id)
        );

        let response = self
            .http
            .delete(url)
            .header(COOKIE, self.cookie_header())
            .query(&[("upload_id", upload_id)])
            .send()
            .await
            .map_err(|e| UploadError::Transport(format!("cancel call failed: {e}")))?;

        let status = response.status();
        info!("[TRANSPORT] DELETE /blob/upload -> {}", status.as_u16());

        if !status.is_success() {
            return Err(UploadError::Transport(error_detail(response, status).await));
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Catalog Calls
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetches all artifacts belonging to the authenticated user.
    pub async fn fetch_blobs(&self) -> Result<Vec<BlobArtifact>, UploadError> {
        let url = self.endpoint("blob/fetch")?;

        info!("[TRANSPORT] GET /blob/fetch");

        let response = self
            .http
            .get(url)
            .header(COOKIE, self.cookie_header())
            .send()
            .await
            .map_err(|e| UploadError::Transport(format!("fetch call failed: {e}")))?;

        let status = response.status();
        info!("[TRANSPORT] GET /blob/fetch -> {}", status.as_u16());

        if !status.is_success() {
            return Err(UploadError::Transport(error_detail(response, status).await));
        }

        response
            .json::<Vec<BlobArtifact>>()
            .await
            .map_err(|e| UploadError::Transport(format!("failed to parse blob list: {e}")))
    }

    /// Deletes one persisted artifact by UID.
    pub async fn delete_blob(&self, blob_uid: &str) -> Result<(), UploadError> {
        let url = self.endpoint("blob/delete")?;

        info!("[TRANSPORT] DELETE /blob/delete (blob {})", redact_id(blob_uid));

        let response = self
            .http
            .delete(url)
            .header(COOKIE, self.cookie_header())
            .query(&[("blob_uid", blob_uid)])
            .send()
            .await
            .map_err(|e| UploadError::Transport(format!("delete call failed: {e}")))?;

        let status = response.status();
        info!("[TRANSPORT] DELETE /blob/delete -> {}", status.as_u16());

        if !status.is_success() {
            return Err(UploadError::Transport(error_detail(response, status).await));
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn endpoint(&self, path: &str) -> Result<Url, UploadError> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| UploadError::Config(format!("failed to build URL for {path}: {e}")))
    }

    fn cookie_header(&self) -> String {
        format!(
            "{ACCESS_TOKEN_COOKIE}={}",
            self.config.access_token.expose_secret()
        )
    }

    /// Reads the byte range of `part` from the source file.
    async fn read_chunk(&self, part: &Part) -> Result<Vec<u8>, UploadError> {
        let mut file = tokio::fs::File::open(&self.file_path)
            .await
            .map_err(|e| UploadError::Transport(format!("failed to open source file: {e}")))?;

        file.seek(SeekFrom::Start(part.start()))
            .await
            .map_err(|e| UploadError::Transport(format!("seek to part {} failed: {e}", part.index())))?;

        let mut chunk = vec![0u8; part.len() as usize];
        file.read_exact(&mut chunk)
            .await
            .map_err(|e| UploadError::Transport(format!("read of part {} failed: {e}", part.index())))?;

        Ok(chunk)
    }
}

impl BlobTransport for HttpBlobTransport {
    fn create(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<String, UploadError>> + Send + '_>> {
        Box::pin(self.create_impl())
    }

    fn upload_part<'a>(
        &'a self,
        part: &'a Part,
        upload_id: &'a str,
        token: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<PartOutcome, UploadError>> + Send + 'a>> {
        Box::pin(self.upload_part_impl(part, upload_id, token))
    }

    fn finalize<'a>(
        &'a self,
        file_name: &'a str,
        upload_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<BlobArtifact, UploadError>> + Send + 'a>> {
        Box::pin(self.finalize_impl(file_name, upload_id))
    }

    fn cancel<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>> {
        Box::pin(self.cancel_impl(upload_id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Handling
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts the backend's `{detail}` message, falling back to the status line.
async fn error_detail(response: reqwest::Response, status: StatusCode) -> String {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("unable to read error body"));

    if let Ok(err) = serde_json::from_str::<ErrorBody>(&body) {
        format!("HTTP {}: {}", status.as_u16(), err.detail)
    } else {
        format!(
            "HTTP {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("unknown error")
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::upload::store::test_part;

    /// Writes a throwaway source file of `size` bytes and binds a transport
    /// to it against the mock server.
    async fn transport_for(
        mock_url: &str,
        size: usize,
    ) -> (HttpBlobTransport, TempDir) {
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join("holiday.mp4");
        tokio::fs::write(&file_path, vec![0xAB; size]).await.unwrap();

        let config = TransportConfig::new(Url::parse(mock_url).unwrap(), "test_token");
        let transport = HttpBlobTransport::open(config, &file_path).await.unwrap();
        (transport, dir)
    }

    fn artifact_json() -> serde_json::Value {
        serde_json::json!({
            "uid": "0123456789abcdef0123456789abcdef",
            "fileName": "holiday.mp4",
            "mimeType": "video/mp4",
            "createdAt": "2025-06-01T12:00:00Z",
            "validThru": "2025-06-02T12:00:00Z"
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Create Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_returns_the_upload_id() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 8192).await;

        Mock::given(method("POST"))
            .and(path("/blob/upload"))
            .and(header("Cookie", "access_token=test_token"))
            .respond_with(ResponseTemplate::new(201).set_body_string("\"u-42\""))
            .expect(1)
            .mount(&server)
            .await;

        let upload_id = transport.create_impl().await.unwrap();
        assert_eq!(upload_id, "u-42");
    }

    #[tokio::test]
    async fn create_accepts_a_bare_string_body() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 8192).await;

        Mock::given(method("POST"))
            .and(path("/blob/upload"))
            .respond_with(ResponseTemplate::new(201).set_body_string("u-plain"))
            .mount(&server)
            .await;

        assert_eq!(transport.create_impl().await.unwrap(), "u-plain");
    }

    #[tokio::test]
    async fn create_rejects_small_files_without_calling_the_backend() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 100).await;

        // No mock mounted: a request would 404 and surface as Create instead.
        match transport.create_impl().await {
            Err(UploadError::FileTooSmall { size, min }) => {
                assert_eq!(size, 100);
                assert_eq!(min, 4096);
            }
            other => panic!("expected FileTooSmall, got {other:?}"),
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_surfaces_the_backend_detail() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 8192).await;

        Mock::given(method("POST"))
            .and(path("/blob/upload"))
            .respond_with(ResponseTemplate::new(415).set_body_json(serde_json::json!({
                "detail": "mime_type='text/plain' is not supported"
            })))
            .mount(&server)
            .await;

        match transport.create_impl().await {
            Err(UploadError::Create(msg)) => {
                assert!(msg.contains("415"));
                assert!(msg.contains("not supported"));
            }
            other => panic!("expected Create, got {other:?}"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Upload Part Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn upload_part_accepted_on_success() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 8192).await;

        Mock::given(method("PATCH"))
            .and(path("/blob/upload/2"))
            .and(header("Cookie", "access_token=test_token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let part = test_part(2, 4096, 8192);
        let token = CancellationToken::new();
        let outcome = transport.upload_part_impl(&part, "u-42", &token).await.unwrap();
        assert_eq!(outcome, PartOutcome::Accepted);
    }

    #[tokio::test]
    async fn upload_part_rejected_on_server_error() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 8192).await;

        Mock::given(method("PATCH"))
            .and(path("/blob/upload/1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let part = test_part(1, 0, 4096);
        let token = CancellationToken::new();
        let outcome = transport.upload_part_impl(&part, "u-42", &token).await.unwrap();
        assert_eq!(outcome, PartOutcome::Rejected { status: 500 });
    }

    #[tokio::test]
    async fn upload_part_aborts_on_a_pre_tripped_token() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 8192).await;

        let part = test_part(1, 0, 4096);
        let token = CancellationToken::new();
        token.cancel();

        match transport.upload_part_impl(&part, "u-42", &token).await {
            Err(UploadError::Aborted) => {}
            other => panic!("expected Aborted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_part_aborts_mid_flight() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 8192).await;

        Mock::given(method("PATCH"))
            .and(path("/blob/upload/1"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let part = test_part(1, 0, 4096);
        let token = CancellationToken::new();
        let trip = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trip.cancel();
        });

        match transport.upload_part_impl(&part, "u-42", &token).await {
            Err(UploadError::Aborted) => {}
            other => panic!("expected Aborted, got {other:?}"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Finalize Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn finalize_parses_the_artifact() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 8192).await;

        Mock::given(method("PUT"))
            .and(path("/blob/upload"))
            .and(header("Cookie", "access_token=test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(artifact_json()))
            .expect(1)
            .mount(&server)
            .await;

        let artifact = transport.finalize_impl("holiday.mp4", "u-42").await.unwrap();
        assert_eq!(artifact.file_name, "holiday.mp4");
        assert_eq!(artifact.mime_type, "video/mp4");
        assert_eq!(artifact.uid.len(), 32);
    }

    #[tokio::test]
    async fn finalize_failure_is_a_finalize_error() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 8192).await;

        Mock::given(method("PUT"))
            .and(path("/blob/upload"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "detail": "upload=u-42 was not found."
            })))
            .mount(&server)
            .await;

        match transport.finalize_impl("holiday.mp4", "u-42").await {
            Err(UploadError::Finalize(msg)) => assert!(msg.contains("was not found")),
            other => panic!("expected Finalize, got {other:?}"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cancel Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn cancel_hits_the_session_with_the_upload_id() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 8192).await;

        Mock::given(method("DELETE"))
            .and(path("/blob/upload"))
            .and(query_param("upload_id", "u-42"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        transport.cancel_impl("u-42").await.unwrap();
    }

    #[tokio::test]
    async fn cancel_failure_is_a_transport_error() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 8192).await;

        Mock::given(method("DELETE"))
            .and(path("/blob/upload"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(matches!(
            transport.cancel_impl("u-42").await,
            Err(UploadError::Transport(_))
        ));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Catalog Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn fetch_blobs_lists_artifacts() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 8192).await;

        Mock::given(method("GET"))
            .and(path("/blob/fetch"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([artifact_json(), artifact_json()])),
            )
            .mount(&server)
            .await;

        let blobs = transport.fetch_blobs().await.unwrap();
        assert_eq!(blobs.len(), 2);
    }

    #[tokio::test]
    async fn delete_blob_targets_the_uid() {
        let server = MockServer::start().await;
        let (transport, _dir) = transport_for(&server.uri(), 8192).await;

        Mock::given(method("DELETE"))
            .and(path("/blob/delete"))
            .and(query_param("blob_uid", "0123456789abcdef0123456789abcdef"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        transport
            .delete_blob("0123456789abcdef0123456789abcdef")
            .await
            .unwrap();
    }
}
