//! This module drives provisioning of compute resources from a remote capacity-allocation API.
//!
//! A [`ResourceSpec`] is turned into exactly one [`ProvisioningResult`] by the
//! [`Acquirer`](acquire::Acquirer) state machine. The [`Provisioner`](orchestrator::Provisioner)
//! fans a list of specs out over a bounded pool of concurrent acquisitions and
//! [`cleanup_all`](cleanup::cleanup_all) tears previously acquired resources down again.
//!
//! The term `provisional` represents a price-negotiated, preemptible capacity request (a spot
//! request) that may go unfulfilled, to distinguish it from `guaranteed` allocations that are
//! created immediately.
pub mod acquire;
pub mod api;
pub mod cleanup;
pub mod events;
pub mod orchestrator;
pub mod report;
pub mod result;
pub mod spec;

use std::time::Duration;

pub use acquire::{AcquisitionError, Acquirer};
pub use api::{ApiError, ApiResult, ProvisionalRequestId, ResourceApi, ResourceId};
pub use cleanup::{CleanupReport, cleanup_all};
pub use events::EventStreamer;
pub use orchestrator::{ProvisioningReport, ProvisioningSummary, Provisioner};
pub use result::{AllocationKind, ProvisioningOutcome, ProvisioningResult};
pub use spec::{AllocationMode, ProvisionalOptions, ResourceSpec, SpecDefaults};

/// How many acquisitions (or terminations) run at the same time by default.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// How many provisional allocation attempts are made by default.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the second provisional attempt. It doubles after every failed attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Upper bound of the delay between two provisional attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(120);
