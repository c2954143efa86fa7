use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;

use futures::{FutureExt, StreamExt};

use crate::provision::api::{ResourceApi, ResourceId};
use crate::provision::events::EventStreamer;
use crate::provision::orchestrator::panic_message;

/// Outcome of a termination for every submitted resource.
pub type CleanupReport = BTreeMap<ResourceId, bool>;

/// Terminates all given resources, at most `concurrency` at the same time.
///
/// Duplicate ids are terminated only once. The returned report has an entry for each
/// distinct id, failed terminations map to `false`.
pub async fn cleanup_all(
    api: Rc<dyn ResourceApi>,
    ids: Vec<ResourceId>,
    concurrency: usize,
    events: &EventStreamer,
) -> CleanupReport {
    let mut ids = ids;
    ids.sort_unstable();
    ids.dedup();
    log::info!("Terminating {} resource(s)", ids.len());

    let api = &api;
    let report: CleanupReport = futures::stream::iter(ids)
        .map(|id| async move {
            let success = terminate(api.as_ref(), &id).await;
            events.on_resource_terminated(&id, success);
            (id, success)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let terminated = report.values().filter(|success| **success).count();
    log::info!(
        "Cleanup finished: {terminated} terminated, {} failed",
        report.len() - terminated
    );
    report
}

async fn terminate(api: &dyn ResourceApi, id: &ResourceId) -> bool {
    match AssertUnwindSafe(api.terminate(id)).catch_unwind().await {
        Ok(Ok(())) => {
            log::info!("Terminated {id}");
            true
        }
        Ok(Err(error)) => {
            log::error!("Failed to terminate {id}: {error}");
            false
        }
        Err(panic) => {
            log::error!(
                "Termination of {id} crashed: {}",
                panic_message(panic.as_ref())
            );
            false
        }
    }
}
