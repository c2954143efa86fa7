use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;

use crate::common::utils::time::format_duration;
use crate::provision::MAX_RETRY_DELAY;
use crate::provision::api::{
    ApiError, ProvisionalRequestId, ResourceApi, ResourceDescription, ResourceId,
};
use crate::provision::events::EventStreamer;
use crate::provision::result::{AllocationKind, ProvisioningOutcome, ProvisioningResult};
use crate::provision::spec::{
    AllocationMode, ProvisionalOptions, ResourceSpec, SpecDefaults, Tags,
};

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("All {attempts} provisional allocation attempts failed. Last error: {last}")]
    RetryExhausted { attempts: u32, last: ApiError },
    #[error("Resource {resource_id} was allocated, but it could not be finalized: {source}")]
    Finalization {
        resource_id: ResourceId,
        source: ApiError,
    },
    #[error("Failed to tag {}: {source}", resources.join(", "))]
    Tagging {
        resources: Vec<String>,
        source: ApiError,
    },
}

/// States of a single acquisition. Used for tracing the progress of an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionPhase {
    Start,
    GuaranteedPending,
    ProvisionalPending,
    AttemptFailed,
    Backoff,
    ReadinessPending,
    Finalizing,
    Success,
    Failed,
}

impl Display for AcquisitionPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AcquisitionPhase::Start => "start",
            AcquisitionPhase::GuaranteedPending => "guaranteed-pending",
            AcquisitionPhase::ProvisionalPending => "provisional-pending",
            AcquisitionPhase::AttemptFailed => "attempt-failed",
            AcquisitionPhase::Backoff => "backoff",
            AcquisitionPhase::ReadinessPending => "readiness-pending",
            AcquisitionPhase::Finalizing => "finalizing",
            AcquisitionPhase::Success => "success",
            AcquisitionPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Delay between provisional attempts. Starts at the initial delay and doubles after each
/// failed attempt, up to `limit`.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    limit: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, limit: Duration) -> Self {
        Self {
            current: initial.min(limit),
            limit,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn advance(&mut self) {
        self.current = self
            .current
            .checked_mul(2)
            .unwrap_or(self.limit)
            .min(self.limit);
    }
}

/// One cycle of the provisional retry loop.
#[derive(Debug)]
struct AcquisitionAttempt {
    number: u32,
    delay: Duration,
    /// Provisional request created by this attempt, set only while it is outstanding.
    outstanding_request: Option<ProvisionalRequestId>,
}

impl AcquisitionAttempt {
    fn new(number: u32, delay: Duration) -> Self {
        Self {
            number,
            delay,
            outstanding_request: None,
        }
    }
}

/// Resource that reached the `Finalizing` phase.
struct Acquired {
    resource_id: ResourceId,
    request_id: Option<ProvisionalRequestId>,
    attempts: u32,
}

struct AcquisitionFailure {
    attempts: u32,
    error: AcquisitionError,
}

impl AcquisitionFailure {
    fn new<E: Into<AcquisitionError>>(attempts: u32, error: E) -> Self {
        Self {
            attempts,
            error: error.into(),
        }
    }
}

/// Turns a single [`ResourceSpec`] into a [`ProvisioningResult`].
///
/// Errors never escape [`Acquirer::acquire`], they are always reported as a failed result.
#[derive(Clone)]
pub struct Acquirer {
    api: Rc<dyn ResourceApi>,
    defaults: SpecDefaults,
    events: EventStreamer,
}

impl Acquirer {
    pub fn new(api: Rc<dyn ResourceApi>, defaults: SpecDefaults, events: EventStreamer) -> Self {
        Self {
            api,
            defaults,
            events,
        }
    }

    pub fn defaults(&self) -> &SpecDefaults {
        &self.defaults
    }

    pub async fn acquire(&self, spec: &ResourceSpec) -> ProvisioningResult {
        let spec = spec.with_defaults(&self.defaults);
        let name = spec.display_name().to_string();
        let tags = spec.resource_tags(&self.defaults.creator, Utc::now().date_naive());
        let kind = spec.mode.kind();

        log::info!("Provisioning {name} ({}, {})", spec.kind, kind.as_str());
        trace_phase(&name, AcquisitionPhase::Start);

        let acquired = match &spec.mode {
            AllocationMode::Guaranteed => self.acquire_guaranteed(&spec, &name, &tags).await,
            AllocationMode::Provisional(options) => {
                self.acquire_provisional(&spec, &name, options).await
            }
        };
        let acquired = match acquired {
            Ok(acquired) => acquired,
            Err(failure) => return self.fail(name, failure),
        };

        trace_phase(&name, AcquisitionPhase::Finalizing);
        match self.finalize(&name, &acquired, &tags, kind).await {
            Ok((description, warnings)) => {
                trace_phase(&name, AcquisitionPhase::Success);
                log::info!(
                    "{name} is ready: {} (public address: {}, private address: {})",
                    acquired.resource_id,
                    description.public_address.as_deref().unwrap_or("N/A"),
                    description.private_address.as_deref().unwrap_or("N/A"),
                );
                self.events
                    .on_resource_acquired(&name, &acquired.resource_id, acquired.attempts);
                ProvisioningResult {
                    name,
                    attempts: acquired.attempts,
                    outcome: ProvisioningOutcome::Success {
                        resource_id: acquired.resource_id,
                        public_address: description.public_address,
                        private_address: description.private_address,
                        state: description.lifecycle_state,
                        allocation: kind,
                        provisional_request_id: acquired.request_id,
                        warnings,
                    },
                }
            }
            Err(error) => self.fail(
                name,
                AcquisitionFailure::new(
                    acquired.attempts,
                    AcquisitionError::Finalization {
                        resource_id: acquired.resource_id,
                        source: error,
                    },
                ),
            ),
        }
    }

    async fn acquire_guaranteed(
        &self,
        spec: &ResourceSpec,
        name: &str,
        tags: &Tags,
    ) -> Result<Acquired, AcquisitionFailure> {
        trace_phase(name, AcquisitionPhase::GuaranteedPending);
        self.events
            .on_attempt_started(name, 1, 1, AllocationKind::Guaranteed);

        let result = async {
            let resource_id = self.api.allocate_guaranteed(spec, tags).await?;
            log::info!("Allocated {resource_id} for {name}, waiting until it is running");
            trace_phase(name, AcquisitionPhase::ReadinessPending);
            self.api.await_ready(&resource_id).await?;
            Ok::<_, ApiError>(resource_id)
        }
        .await;

        match result {
            Ok(resource_id) => Ok(Acquired {
                resource_id,
                request_id: None,
                attempts: 1,
            }),
            Err(error) => {
                self.events.on_attempt_failed(name, 1, error.to_string());
                Err(AcquisitionFailure::new(1, error))
            }
        }
    }

    async fn acquire_provisional(
        &self,
        spec: &ResourceSpec,
        name: &str,
        options: &ProvisionalOptions,
    ) -> Result<Acquired, AcquisitionFailure> {
        let max_attempts = options.max_retries.max(1);
        let mut backoff = Backoff::new(options.retry_delay, MAX_RETRY_DELAY);
        let mut number = 1;

        loop {
            let mut attempt = AcquisitionAttempt::new(number, backoff.current());
            trace_phase(name, AcquisitionPhase::ProvisionalPending);
            log::info!(
                "Provisional allocation attempt {}/{max_attempts} for {name}",
                attempt.number
            );
            self.events.on_attempt_started(
                name,
                attempt.number,
                max_attempts,
                AllocationKind::Provisional,
            );

            let error = match self
                .try_provisional(spec, name, options, &mut attempt)
                .await
            {
                Ok((resource_id, request_id)) => {
                    return Ok(Acquired {
                        resource_id,
                        request_id: Some(request_id),
                        attempts: attempt.number,
                    });
                }
                Err(error) => error,
            };

            trace_phase(name, AcquisitionPhase::AttemptFailed);
            log::warn!(
                "Provisional attempt {}/{max_attempts} for {name} failed: {error}",
                attempt.number
            );
            self.events
                .on_attempt_failed(name, attempt.number, error.to_string());

            if let Some(request_id) = attempt.outstanding_request.take() {
                self.cancel_request(name, &request_id).await;
            }

            if attempt.number >= max_attempts {
                return Err(AcquisitionFailure::new(
                    attempt.number,
                    AcquisitionError::RetryExhausted {
                        attempts: attempt.number,
                        last: error,
                    },
                ));
            }

            trace_phase(name, AcquisitionPhase::Backoff);
            log::info!(
                "Retrying {name} in {}",
                format_duration(attempt.delay)
            );
            self.events.on_backoff(name, attempt.number, attempt.delay);
            tokio::time::sleep(attempt.delay).await;

            backoff.advance();
            number += 1;
        }
    }

    /// Runs one provisional attempt until the resource is ready.
    ///
    /// The created request is stored in `attempt` as soon as it exists, so that it can be
    /// cancelled when a later step fails.
    async fn try_provisional(
        &self,
        spec: &ResourceSpec,
        name: &str,
        options: &ProvisionalOptions,
        attempt: &mut AcquisitionAttempt,
    ) -> Result<(ResourceId, ProvisionalRequestId), ApiError> {
        let request_id = self
            .api
            .allocate_provisional(spec, options.max_price.as_deref())
            .await?;
        log::debug!("Provisional request {request_id} created for {name}");
        attempt.outstanding_request = Some(request_id.clone());

        let resource_id = self.api.await_fulfilled(&request_id).await?;
        log::info!("Request {request_id} of {name} was fulfilled with {resource_id}");

        trace_phase(name, AcquisitionPhase::ReadinessPending);
        self.api.await_ready(&resource_id).await?;

        attempt.outstanding_request = None;
        Ok((resource_id, request_id))
    }

    async fn cancel_request(&self, name: &str, request_id: &ProvisionalRequestId) {
        let success = match self.api.cancel_provisional(request_id).await {
            Ok(()) => {
                log::info!("Cancelled provisional request {request_id} of {name}");
                true
            }
            Err(error) => {
                log::warn!("Could not cancel provisional request {request_id} of {name}: {error}");
                false
            }
        };
        self.events.on_request_cancelled(name, request_id, success);
    }

    /// Reads back the attributes of the resource and tags it together with its volumes.
    ///
    /// Tagging failures are returned as warnings, they do not fail the acquisition.
    async fn finalize(
        &self,
        name: &str,
        acquired: &Acquired,
        tags: &Tags,
        kind: AllocationKind,
    ) -> Result<(ResourceDescription, Vec<String>), ApiError> {
        let mut warnings = Vec::new();

        // Provisional requests cannot carry tags, so the resource is tagged only now
        if kind == AllocationKind::Provisional {
            let resources = vec![acquired.resource_id.clone()];
            if let Err(warning) = self.tag_resources(name, resources, tags).await {
                warnings.push(warning);
            }
        }

        let description = self.api.describe(&acquired.resource_id).await?;

        if !description.volume_ids.is_empty() {
            log::debug!(
                "Tagging volumes {} of {name}",
                description.volume_ids.join(", ")
            );
            if let Err(warning) = self
                .tag_resources(name, description.volume_ids.clone(), tags)
                .await
            {
                warnings.push(warning);
            }
        }
        Ok((description, warnings))
    }

    async fn tag_resources(
        &self,
        name: &str,
        resources: Vec<String>,
        tags: &Tags,
    ) -> Result<(), String> {
        match self.api.tag(&resources, tags).await {
            Ok(()) => Ok(()),
            Err(source) => {
                let error = AcquisitionError::Tagging {
                    resources: resources.clone(),
                    source,
                }
                .to_string();
                log::warn!("{name} was acquired, but tagging failed: {error}");
                self.events
                    .on_tagging_failed(name, &resources, error.clone());
                Err(error)
            }
        }
    }

    fn fail(&self, name: String, failure: AcquisitionFailure) -> ProvisioningResult {
        trace_phase(&name, AcquisitionPhase::Failed);
        let error = failure.error.to_string();
        log::error!("Provisioning of {name} failed: {error}");
        self.events
            .on_acquisition_failed(&name, failure.attempts, error.clone());
        ProvisioningResult::failed(name, failure.attempts, error)
    }
}

fn trace_phase(name: &str, phase: AcquisitionPhase) {
    log::trace!("{name}: entering phase {phase}");
}
