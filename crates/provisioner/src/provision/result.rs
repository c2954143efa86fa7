use serde::{Deserialize, Serialize};

use crate::provision::api::{ProvisionalRequestId, ResourceId};

/// Allocation path that was actually used to acquire a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationKind {
    #[serde(alias = "on-demand")]
    Guaranteed,
    #[serde(alias = "spot")]
    Provisional,
}

impl AllocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationKind::Guaranteed => "guaranteed",
            AllocationKind::Provisional => "provisional",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProvisioningOutcome {
    // Aliases accept reports written by earlier versions of the tool
    Success {
        #[serde(alias = "instance_id")]
        resource_id: ResourceId,
        #[serde(alias = "public_ip")]
        public_address: Option<String>,
        #[serde(alias = "private_ip")]
        private_address: Option<String>,
        /// Lifecycle state observed when the resource was described.
        state: String,
        #[serde(alias = "instance_type")]
        allocation: AllocationKind,
        /// ID of the fulfilled provisional request.
        #[serde(
            default,
            alias = "spot_request_id",
            skip_serializing_if = "Option::is_none"
        )]
        provisional_request_id: Option<ProvisionalRequestId>,
        /// Non-fatal problems, e.g. tags that could not be attached.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    Failed {
        error: String,
    },
}

/// Terminal record of a single resource spec. Exactly one is produced per spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningResult {
    pub name: String,
    /// How many allocation attempts were made.
    #[serde(default)]
    pub attempts: u32,
    #[serde(flatten)]
    pub outcome: ProvisioningOutcome,
}

impl ProvisioningResult {
    pub fn failed<S: Into<String>>(name: String, attempts: u32, error: S) -> Self {
        Self {
            name,
            attempts,
            outcome: ProvisioningOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ProvisioningOutcome::Success { .. })
    }

    pub fn resource_id(&self) -> Option<&str> {
        match &self.outcome {
            ProvisioningOutcome::Success { resource_id, .. } => Some(resource_id),
            ProvisioningOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ProvisioningOutcome::Success { .. } => None,
            ProvisioningOutcome::Failed { error } => Some(error),
        }
    }
}
