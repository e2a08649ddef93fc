//! Resumable multipart upload client for the Hiresify blob service.
//!
//! Splits a local file into fixed-size parts, drives them through a
//! bounded-concurrency scheduler with per-part cancellation, and exposes
//! pause / resume / retry / abort controls with an observable status feed.
//!
//! # Architecture
//!
//! - [`upload::PartStore`] - per-file bookkeeping of parts by lifecycle
//!   bucket; pure state, no I/O
//! - [`upload::JobQueue`] - bounded-concurrency FIFO runner shared by every
//!   upload in the process
//! - [`upload::UploadController`] - per-file facade owning the upload id,
//!   the cancellation tokens, and the state machine
//! - [`transport::BlobTransport`] - the four-call protocol boundary
//!   (create / upload-part / finalize / cancel), implemented over HTTP by
//!   [`transport::HttpBlobTransport`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hiresify_client::{
//!     HttpBlobTransport, JobQueue, TransportConfig, UploadController, UploadState,
//! };
//!
//! # async fn run() -> Result<(), hiresify_client::UploadError> {
//! let config = TransportConfig::from_env()?;
//! let queue = JobQueue::new(config.concurrency);
//!
//! let transport = HttpBlobTransport::open(config, "holiday.mp4").await?;
//! let (file_size, part_size) = (transport.file_size(), transport.part_size());
//! let controller = UploadController::new(
//!     Arc::new(transport),
//!     queue,
//!     "holiday.mp4",
//!     file_size,
//!     part_size,
//! );
//!
//! let mut status = controller.subscribe();
//! controller.start().await;
//!
//! while status.changed().await.is_ok() {
//!     let snapshot = status.borrow_and_update().clone();
//!     println!("{:.1}% {:?}", snapshot.progress, snapshot.state);
//!     if matches!(snapshot.state, UploadState::Done | UploadState::Failed) {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod transport;
pub mod upload;

pub use config::TransportConfig;
pub use error::UploadError;
pub use transport::{BlobArtifact, BlobTransport, HttpBlobTransport, PartOutcome};
pub use upload::{JobQueue, Part, PartStore, UploadController, UploadState, UploadStatus};
