//! The upload engine: part bookkeeping, the shared job queue, per-part jobs,
//! and the controller state machine.

pub mod controller;
mod job;
pub mod queue;
pub mod status;
pub mod store;

pub use controller::UploadController;
pub use queue::JobQueue;
pub use status::{UploadState, UploadStatus};
pub use store::{Part, PartStore};
