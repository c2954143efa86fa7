pub mod aws;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provision::spec::{ResourceSpec, Tags};

pub type ResourceId = String;
pub type ProvisionalRequestId = String;

pub type ApiResult<T> = Result<T, ApiError>;
pub type ApiFuture<T> = Pin<Box<dyn Future<Output = ApiResult<T>>>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The provider rejected or failed the request (quota, validation, permissions, network).
    #[error("{operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },
    /// A wait for an asynchronous condition exceeded its ceiling.
    #[error(
        "timed out after {} waiting for {condition} of {id}",
        humantime::format_duration(*after)
    )]
    Timeout {
        condition: &'static str,
        id: String,
        after: Duration,
    },
    #[error("unexpected response from {operation}: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },
}

impl ApiError {
    pub fn request<S: Into<String>>(operation: &'static str, message: S) -> Self {
        Self::Request {
            operation,
            message: message.into(),
        }
    }

    pub fn invalid_response<S: Into<String>>(operation: &'static str, message: S) -> Self {
        Self::InvalidResponse {
            operation,
            message: message.into(),
        }
    }
}

/// Attributes of an acquired resource, read back after it became ready.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescription {
    pub public_address: Option<String>,
    pub private_address: Option<String>,
    pub lifecycle_state: String,
    pub volume_ids: Vec<String>,
}

/// Capability to talk to a remote capacity-allocation API (e.g. EC2).
///
/// The returned futures do not borrow the handler, so that many acquisitions can share one
/// handler and wait on the provider at the same time.
pub trait ResourceApi {
    /// Cheap read-only call that checks that the credentials are usable.
    fn check_access(&self) -> ApiFuture<()>;

    /// Create a single resource immediately, with `tags` attached at creation time.
    fn allocate_guaranteed(&self, spec: &ResourceSpec, tags: &Tags) -> ApiFuture<ResourceId>;

    /// Issue a provisional request. `max_price` is sent only if it is present.
    fn allocate_provisional(
        &self,
        spec: &ResourceSpec,
        max_price: Option<&str>,
    ) -> ApiFuture<ProvisionalRequestId>;

    /// Wait until the provisional request is fulfilled and return the created resource.
    fn await_fulfilled(&self, request: &ProvisionalRequestId) -> ApiFuture<ResourceId>;

    /// Wait until the resource reaches an operable lifecycle state.
    fn await_ready(&self, resource: &ResourceId) -> ApiFuture<()>;

    /// Cancel an outstanding provisional request.
    fn cancel_provisional(&self, request: &ProvisionalRequestId) -> ApiFuture<()>;

    fn tag(&self, resources: &[String], tags: &Tags) -> ApiFuture<()>;

    fn describe(&self, resource: &ResourceId) -> ApiFuture<ResourceDescription>;

    fn terminate(&self, resource: &ResourceId) -> ApiFuture<()>;
}
