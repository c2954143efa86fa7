use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::time::Duration;

use derive_builder::Builder;

use crate::provision::api::{
    ApiError, ApiFuture, ProvisionalRequestId, ResourceApi, ResourceDescription, ResourceId,
};
use crate::provision::events::{Event, EventPayload, EventSink};
use crate::provision::spec::{AllocationMode, ProvisionalOptions, ResourceSpec, Tags};

pub fn init_logging() {
    let _ = env_logger::Builder::default()
        .filter(None, log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Where a provisional attempt fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePoint {
    /// The provisional request itself is rejected, no request id is obtained.
    Allocate,
    /// The request is created but never fulfilled.
    #[default]
    Fulfillment,
    /// The request is fulfilled but the resource never becomes ready.
    Readiness,
}

/// Scripted behavior of the mock API for a single resource (selected by its name).
#[derive(Clone, Debug, Default)]
pub struct Behavior {
    /// The guaranteed allocation call fails.
    pub guaranteed_fails: bool,
    /// How many provisional attempts fail before one succeeds. `None` = all attempts fail.
    pub provisional_failures: Option<u32>,
    pub failure_point: FailurePoint,
    /// Tagging of the resource and its volumes is rejected.
    pub tag_fails: bool,
    /// Cancellation of its provisional requests is rejected.
    pub cancel_fails: bool,
    pub describe_fails: bool,
    /// How long it takes for the resource to become ready.
    pub ready_delay: Duration,
    /// The guaranteed or provisional allocation call panics.
    pub panics: bool,
    /// Failure point of each provisional attempt. Overrides `provisional_failures` when
    /// non-empty, attempts past its end succeed.
    pub script: Vec<FailurePoint>,
}

impl Behavior {
    pub fn always_fails(failure_point: FailurePoint) -> Self {
        Self {
            provisional_failures: None,
            failure_point,
            ..Default::default()
        }
    }

    pub fn fails_times(count: u32, failure_point: FailurePoint) -> Self {
        Self {
            provisional_failures: Some(count),
            failure_point,
            ..Default::default()
        }
    }

    pub fn scripted(script: Vec<FailurePoint>) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    pub fn succeeds() -> Self {
        Self::fails_times(0, FailurePoint::default())
    }

    pub fn ready_after(delay: Duration) -> Self {
        Self {
            ready_delay: delay,
            ..Self::succeeds()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiCall {
    AllocateGuaranteed { name: String, tags: Tags },
    AllocateProvisional { name: String, max_price: Option<String> },
    AwaitFulfilled(ProvisionalRequestId),
    AwaitReady(ResourceId),
    CancelProvisional(ProvisionalRequestId),
    Tag(Vec<String>),
    Describe(ResourceId),
    Terminate(ResourceId),
}

#[derive(Default)]
pub struct MockState {
    pub calls: Vec<ApiCall>,
    behaviors: BTreeMap<String, Behavior>,
    /// Number of provisional attempts made per resource name.
    attempts: BTreeMap<String, u32>,
    /// Owner (resource name) of each issued request/resource id.
    owners: BTreeMap<String, String>,
    failing_terminations: BTreeSet<ResourceId>,
    panicking_terminations: BTreeSet<ResourceId>,
    termination_delay: Duration,
    in_flight: usize,
    pub max_in_flight: usize,
}

impl MockState {
    fn behavior(&self, name: &str) -> Behavior {
        self.behaviors.get(name).cloned().unwrap_or_else(Behavior::succeeds)
    }

    fn owner_behavior(&self, id: &str) -> (String, Behavior) {
        let name = self.owners.get(id).cloned().unwrap_or_default();
        let behavior = self.behavior(&name);
        (name, behavior)
    }

    /// Should the current provisional attempt of `name` fail?
    fn attempt_fails(&self, name: &str, behavior: &Behavior, point: FailurePoint) -> bool {
        let attempt = self.attempts.get(name).copied().unwrap_or(0);
        if !behavior.script.is_empty() {
            return attempt
                .checked_sub(1)
                .and_then(|index| behavior.script.get(index as usize))
                == Some(&point);
        }
        if behavior.failure_point != point {
            return false;
        }
        match behavior.provisional_failures {
            None => true,
            Some(failures) => attempt <= failures,
        }
    }
}

/// In-memory [`ResourceApi`] with scripted per-resource behavior.
#[derive(Clone, Default)]
pub struct MockApi {
    state: Rc<RefCell<MockState>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(self, name: &str, behavior: Behavior) -> Self {
        self.state
            .borrow_mut()
            .behaviors
            .insert(name.to_string(), behavior);
        self
    }

    pub fn with_failing_termination(self, id: &str) -> Self {
        self.state
            .borrow_mut()
            .failing_terminations
            .insert(id.to_string());
        self
    }

    pub fn with_panicking_termination(self, id: &str) -> Self {
        self.state
            .borrow_mut()
            .panicking_terminations
            .insert(id.to_string());
        self
    }

    /// Every termination takes `delay` and is counted as in flight meanwhile.
    pub fn with_termination_delay(self, delay: Duration) -> Self {
        self.state.borrow_mut().termination_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.borrow().calls.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.borrow().max_in_flight
    }

    pub fn count_calls<F: Fn(&ApiCall) -> bool>(&self, filter: F) -> usize {
        self.state.borrow().calls.iter().filter(|c| filter(c)).count()
    }

    fn record(&self, call: ApiCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl ResourceApi for MockApi {
    fn check_access(&self) -> ApiFuture<()> {
        Box::pin(async move { Ok(()) })
    }

    fn allocate_guaranteed(&self, spec: &ResourceSpec, tags: &Tags) -> ApiFuture<ResourceId> {
        let name = spec.display_name().to_string();
        self.record(ApiCall::AllocateGuaranteed {
            name: name.clone(),
            tags: tags.clone(),
        });
        let state = self.state.clone();
        Box::pin(async move {
            let behavior = state.borrow().behavior(&name);
            if behavior.panics {
                panic!("allocation of {name} panicked");
            }
            if behavior.guaranteed_fails {
                return Err(ApiError::request("run-instances", "InsufficientInstanceCapacity"));
            }
            let id = format!("i-{name}");
            state.borrow_mut().owners.insert(id.clone(), name);
            Ok(id)
        })
    }

    fn allocate_provisional(
        &self,
        spec: &ResourceSpec,
        max_price: Option<&str>,
    ) -> ApiFuture<ProvisionalRequestId> {
        let name = spec.display_name().to_string();
        self.record(ApiCall::AllocateProvisional {
            name: name.clone(),
            max_price: max_price.map(|p| p.to_string()),
        });
        let state = self.state.clone();
        Box::pin(async move {
            let mut state = state.borrow_mut();
            let attempt = {
                let attempt = state.attempts.entry(name.clone()).or_default();
                *attempt += 1;
                *attempt
            };
            let behavior = state.behavior(&name);
            if behavior.panics {
                panic!("allocation of {name} panicked");
            }
            if state.attempt_fails(&name, &behavior, FailurePoint::Allocate) {
                return Err(ApiError::request("request-spot-instances", "MaxSpotInstanceCountExceeded"));
            }
            let id = format!("sir-{name}-{attempt}");
            state.owners.insert(id.clone(), name);
            Ok(id)
        })
    }

    fn await_fulfilled(&self, request: &ProvisionalRequestId) -> ApiFuture<ResourceId> {
        self.record(ApiCall::AwaitFulfilled(request.clone()));
        let state = self.state.clone();
        let request = request.clone();
        Box::pin(async move {
            let mut state = state.borrow_mut();
            let (name, behavior) = state.owner_behavior(&request);
            if state.attempt_fails(&name, &behavior, FailurePoint::Fulfillment) {
                return Err(ApiError::Timeout {
                    condition: "spot-instance-request-fulfilled",
                    id: request,
                    after: Duration::from_secs(600),
                });
            }
            let id = format!("i-{}", request.trim_start_matches("sir-"));
            state.owners.insert(id.clone(), name);
            Ok(id)
        })
    }

    fn await_ready(&self, resource: &ResourceId) -> ApiFuture<()> {
        self.record(ApiCall::AwaitReady(resource.clone()));
        let state = self.state.clone();
        let resource = resource.clone();
        Box::pin(async move {
            let (name, behavior) = state.borrow().owner_behavior(&resource);
            {
                let mut state = state.borrow_mut();
                state.in_flight += 1;
                state.max_in_flight = state.max_in_flight.max(state.in_flight);
            }
            tokio::time::sleep(behavior.ready_delay).await;
            let mut state = state.borrow_mut();
            state.in_flight -= 1;
            if state.attempt_fails(&name, &behavior, FailurePoint::Readiness) {
                return Err(ApiError::request("wait", "Waiter InstanceRunning failed"));
            }
            Ok(())
        })
    }

    fn cancel_provisional(&self, request: &ProvisionalRequestId) -> ApiFuture<()> {
        self.record(ApiCall::CancelProvisional(request.clone()));
        let state = self.state.clone();
        let request = request.clone();
        Box::pin(async move {
            let (_, behavior) = state.borrow().owner_behavior(&request);
            if behavior.cancel_fails {
                return Err(ApiError::request(
                    "cancel-spot-instance-requests",
                    "RequestLimitExceeded",
                ));
            }
            Ok(())
        })
    }

    fn tag(&self, resources: &[String], _tags: &Tags) -> ApiFuture<()> {
        self.record(ApiCall::Tag(resources.to_vec()));
        let state = self.state.clone();
        let resource = resources.first().cloned().unwrap_or_default();
        Box::pin(async move {
            let (_, behavior) = state.borrow().owner_behavior(&resource);
            if behavior.tag_fails {
                return Err(ApiError::request("create-tags", "UnauthorizedOperation"));
            }
            Ok(())
        })
    }

    fn describe(&self, resource: &ResourceId) -> ApiFuture<ResourceDescription> {
        self.record(ApiCall::Describe(resource.clone()));
        let state = self.state.clone();
        let resource = resource.clone();
        Box::pin(async move {
            let (name, behavior) = state.borrow().owner_behavior(&resource);
            if behavior.describe_fails {
                return Err(ApiError::request("describe-instances", "RequestLimitExceeded"));
            }
            let volume = format!("vol-{}", resource.trim_start_matches("i-"));
            state.borrow_mut().owners.insert(volume.clone(), name);
            Ok(ResourceDescription {
                public_address: Some("203.0.113.10".to_string()),
                private_address: Some("10.0.0.10".to_string()),
                lifecycle_state: "running".to_string(),
                volume_ids: vec![volume],
            })
        })
    }

    fn terminate(&self, resource: &ResourceId) -> ApiFuture<()> {
        self.record(ApiCall::Terminate(resource.clone()));
        let state = self.state.clone();
        let resource = resource.clone();
        Box::pin(async move {
            let (fails, panics, delay) = {
                let mut state = state.borrow_mut();
                state.in_flight += 1;
                state.max_in_flight = state.max_in_flight.max(state.in_flight);
                (
                    state.failing_terminations.contains(&resource),
                    state.panicking_terminations.contains(&resource),
                    state.termination_delay,
                )
            };
            tokio::time::sleep(delay).await;
            state.borrow_mut().in_flight -= 1;
            if panics {
                panic!("termination of {resource} panicked");
            }
            if fails {
                return Err(ApiError::request("terminate-instances", "InvalidInstanceID.NotFound"));
            }
            Ok(())
        })
    }
}

/// Sink that keeps all received events in memory.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Rc<RefCell<Vec<EventPayload>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<EventPayload> {
        self.events.borrow().clone()
    }

    pub fn backoff_delays(&self, name: &str) -> Vec<Duration> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                EventPayload::BackoffWait {
                    name: event_name,
                    delay,
                    ..
                } if event_name == name => Some(*delay),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn on_event(&self, event: &Event) {
        self.events.borrow_mut().push(event.payload.clone());
    }
}

// Spec definitions
#[derive(Builder)]
#[builder(pattern = "owned", build_fn(name = "finish"))]
pub struct TestSpec {
    name: String,
    #[builder(default = "\"t3.micro\".to_string()")]
    kind: String,
    #[builder(default = "true")]
    provisional: bool,
    #[builder(default)]
    max_price: Option<String>,
    #[builder(default = "3")]
    max_retries: u32,
    #[builder(default = "Duration::from_millis(1)")]
    retry_delay: Duration,
}

impl TestSpecBuilder {
    pub fn build(self) -> ResourceSpec {
        let TestSpec {
            name,
            kind,
            provisional,
            max_price,
            max_retries,
            retry_delay,
        } = self.finish().unwrap();
        let mode = if provisional {
            AllocationMode::Provisional(ProvisionalOptions {
                max_price,
                max_retries,
                retry_delay,
            })
        } else {
            AllocationMode::Guaranteed
        };
        ResourceSpec::new(kind).with_name(name).with_mode(mode)
    }
}

pub fn provisional_spec(name: &str) -> ResourceSpec {
    TestSpecBuilder::default().name(name.to_string()).build()
}

pub fn guaranteed_spec(name: &str) -> ResourceSpec {
    TestSpecBuilder::default()
        .name(name.to_string())
        .provisional(false)
        .build()
}
