use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::time::SystemTime;

use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};

use crate::provision::acquire::Acquirer;
use crate::provision::api::ResourceApi;
use crate::provision::events::EventStreamer;
use crate::provision::result::ProvisioningResult;
use crate::provision::spec::{ResourceSpec, SpecDefaults};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl ProvisioningSummary {
    pub fn from_results(results: &[ProvisioningResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            succeeded,
            failed: results.len() - succeeded,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Results of a batch in completion order, together with their summary counts.
#[derive(Debug, Clone)]
pub struct ProvisioningReport {
    pub results: Vec<ProvisioningResult>,
    pub summary: ProvisioningSummary,
}

/// Runs acquisitions of many specs on a bounded pool of concurrently running tasks.
pub struct Provisioner {
    acquirer: Acquirer,
    concurrency: usize,
}

impl Provisioner {
    /// `concurrency` is the maximum number of acquisitions in flight, zero is treated as one.
    pub fn new(
        api: Rc<dyn ResourceApi>,
        defaults: SpecDefaults,
        events: EventStreamer,
        concurrency: usize,
    ) -> Self {
        Self {
            acquirer: Acquirer::new(api, defaults, events),
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn acquire_all(&self, specs: Vec<ResourceSpec>) -> ProvisioningReport {
        log::info!(
            "Provisioning {} resource(s), at most {} at once",
            specs.len(),
            self.concurrency
        );

        let specs = with_batch_defaults(specs, self.acquirer.defaults(), SystemTime::now());
        let results: Vec<ProvisioningResult> = futures::stream::iter(specs)
            .map(|spec| self.acquire_guarded(spec))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let summary = ProvisioningSummary::from_results(&results);
        log::info!(
            "Provisioning finished: {} succeeded, {} failed",
            summary.succeeded,
            summary.failed
        );
        ProvisioningReport { results, summary }
    }

    /// Acquires a single spec. A panic inside the acquisition is turned into a failed result,
    /// so that it does not take down the other acquisitions of the batch.
    async fn acquire_guarded(&self, spec: ResourceSpec) -> ProvisioningResult {
        match AssertUnwindSafe(self.acquirer.acquire(&spec))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let name = spec.display_name().to_string();
                let message = panic_message(panic.as_ref());
                log::error!("Provisioning of {name} crashed: {message}");
                ProvisioningResult::failed(name, 0, format!("Unexpected error: {message}"))
            }
        }
    }
}

/// Applies defaults to every spec of a batch. Generated names are unique within the batch,
/// a name that is already taken gets a numeric suffix.
fn with_batch_defaults(
    specs: Vec<ResourceSpec>,
    defaults: &SpecDefaults,
    now: SystemTime,
) -> Vec<ResourceSpec> {
    let mut taken: BTreeSet<String> = specs
        .iter()
        .filter_map(|spec| spec.name.as_deref())
        .filter(|name| !name.is_empty())
        .map(|name| name.to_string())
        .collect();
    specs
        .into_iter()
        .map(|spec| {
            let named = spec.name.as_deref().is_some_and(|name| !name.is_empty());
            let mut spec = spec.with_defaults_at(defaults, now);
            if !named {
                let base = spec.display_name().to_string();
                let mut name = base.clone();
                let mut suffix = 2;
                while taken.contains(&name) {
                    name = format!("{base}-{suffix}");
                    suffix += 1;
                }
                taken.insert(name.clone());
                spec.name = Some(name);
            }
            spec
        })
        .collect()
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
