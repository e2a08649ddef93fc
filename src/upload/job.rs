//! Job construction for single part-upload attempts.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::UploadError;
use crate::transport::PartOutcome;
use crate::upload::controller::ControllerCore;
use crate::upload::store::Part;

/// Builds the async job for one attempt at uploading `part`.
///
/// The job performs exactly one transport call, classifies the outcome,
/// updates the store, publishes progress, and runs the controller's
/// finalization hook when its own update left the store quiescent. An aborted
/// call returns without touching anything: the part was already re-queued by
/// `pause` or discarded by `abort`.
pub(crate) fn part_job(
    core: Arc<ControllerCore>,
    part: Part,
    token: CancellationToken,
) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let Some(upload_id) = core.upload_id() else {
            // Jobs are only enqueued after create assigned the id; reaching
            // this means the controller was torn down mid-drain.
            return;
        };

        let outcome = core
            .transport
            .upload_part(&part, &upload_id, &token)
            .await;

        let transitioned = match outcome {
            Ok(PartOutcome::Accepted) => core.store.pass_part(&part).await,
            Ok(PartOutcome::Rejected { status }) => {
                warn!(
                    "[UPLOAD] part {} of {} rejected with HTTP {}",
                    part.index(),
                    core.file_name,
                    status
                );
                core.store.fail_part(&part).await
            }
            Err(UploadError::Aborted) => return,
            Err(err) => {
                warn!(
                    "[UPLOAD] part {} of {} failed: {}",
                    part.index(),
                    core.file_name,
                    err
                );
                core.store.fail_part(&part).await
            }
        };

        if !transitioned {
            // Late completion: the part was re-homed by pause while the
            // response was in flight. The store no longer counts this attempt.
            return;
        }

        core.drop_token(part.index());
        core.publish_progress().await;

        // `drained` rather than `quiescent`: a sibling job settling while the
        // controller is still handing out parts must not trigger the hook.
        if core.store.drained().await {
            core.try_finalize().await;
        }
    }
}
