use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;

use crate::common::utils::time::unix_timestamp;
use crate::provision::result::AllocationKind;
use crate::provision::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};

/// Tag key/value pairs. Keys are unique and iterate in a stable order.
pub type Tags = BTreeMap<String, String>;

pub const DEFAULT_IMAGE: &str = "ami-0ae8595e2aff47037";
pub const DEFAULT_VOLUME_SIZE_GB: u32 = 8;
pub const DEFAULT_VOLUME_CLASS: &str = "gp3";
pub const DEFAULT_CREATOR: &str = "provisioner";

/// Parameters of the provisional (price-negotiated, preemptible) acquisition path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalOptions {
    /// Maximum price. `None` accepts the current market price.
    pub max_price: Option<String>,
    /// How many allocation attempts are made before giving up.
    pub max_retries: u32,
    /// Delay before the second attempt.
    pub retry_delay: Duration,
}

impl Default for ProvisionalOptions {
    fn default() -> Self {
        Self {
            max_price: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationMode {
    /// Immediate, fixed-price allocation. Failures are not retried.
    Guaranteed,
    /// Provisional request that has to be fulfilled by the provider, retried with backoff.
    Provisional(ProvisionalOptions),
}

impl Default for AllocationMode {
    fn default() -> Self {
        Self::Provisional(ProvisionalOptions::default())
    }
}

impl AllocationMode {
    pub fn kind(&self) -> AllocationKind {
        match self {
            AllocationMode::Guaranteed => AllocationKind::Guaranteed,
            AllocationMode::Provisional(_) => AllocationKind::Provisional,
        }
    }

    /// Value of the `InstanceType` tag that is attached when the spec has no tags of its own.
    pub fn tag_value(&self) -> &'static str {
        match self {
            AllocationMode::Guaranteed => "OnDemand",
            AllocationMode::Provisional(_) => "Spot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    pub size_gb: u32,
    pub class: String,
}

impl Default for VolumeSpec {
    fn default() -> Self {
        Self {
            size_gb: DEFAULT_VOLUME_SIZE_GB,
            class: DEFAULT_VOLUME_CLASS.to_string(),
        }
    }
}

/// Immutable description of one desired resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    /// Kind/size identifier (e.g. `t3.micro`).
    pub kind: String,
    pub name: Option<String>,
    /// Image/template reference.
    pub image: Option<String>,
    pub key_name: Option<String>,
    pub security_groups: Vec<String>,
    pub subnet: Option<String>,
    pub instance_profile: Option<String>,
    pub volume: VolumeSpec,
    /// Startup payload passed to the resource on boot.
    pub user_data: Option<String>,
    pub tags: Option<Tags>,
    pub mode: AllocationMode,
}

impl ResourceSpec {
    /// Creates a spec of the given kind with every optional field unset and the default
    /// (provisional) allocation mode.
    pub fn new<S: Into<String>>(kind: S) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            image: None,
            key_name: None,
            security_groups: vec![],
            subnet: None,
            instance_profile: None,
            volume: VolumeSpec::default(),
            user_data: None,
            tags: None,
            mode: AllocationMode::default(),
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_mode(mut self, mode: AllocationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Name used to identify the spec in logs and results, even before defaults were applied.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.kind,
        }
    }

    /// Returns a copy of the spec with missing fields filled in. `self` is left untouched.
    ///
    /// Applying defaults to an already defaulted spec returns an identical spec.
    pub fn with_defaults(&self, defaults: &SpecDefaults) -> ResourceSpec {
        self.with_defaults_at(defaults, SystemTime::now())
    }

    pub(crate) fn with_defaults_at(&self, defaults: &SpecDefaults, now: SystemTime) -> ResourceSpec {
        let mut spec = self.clone();
        if is_missing(spec.name.as_deref()) {
            spec.name = Some(format!("{}-{}", spec.kind, unix_timestamp(now)));
        }
        if is_missing(spec.image.as_deref()) {
            spec.image = Some(defaults.image.clone());
        }
        if spec.tags.as_ref().is_none_or(|tags| tags.is_empty()) {
            spec.tags = Some(defaults.standard_tags(&spec.mode));
        }
        spec
    }

    /// Tag set attached to the resource and to all of its volumes.
    ///
    /// Tags of the spec override the generated `Name`, `CreatedBy` and `CreationDate` tags.
    pub fn resource_tags(&self, creator: &str, created_at: NaiveDate) -> Tags {
        let mut tags = Tags::new();
        tags.insert("Name".to_string(), self.display_name().to_string());
        tags.insert("CreatedBy".to_string(), creator.to_string());
        tags.insert(
            "CreationDate".to_string(),
            created_at.format("%Y-%m-%d").to_string(),
        );
        if let Some(spec_tags) = &self.tags {
            tags.extend(spec_tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        tags
    }
}

fn is_missing(value: Option<&str>) -> bool {
    value.is_none_or(|value| value.is_empty())
}

/// Values used to fill in missing fields of a [`ResourceSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecDefaults {
    pub image: String,
    pub environment: String,
    pub project: String,
    /// Value of the `CreatedBy` tag.
    pub creator: String,
}

impl Default for SpecDefaults {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            environment: "Development".to_string(),
            project: "AutoProvisioned".to_string(),
            creator: DEFAULT_CREATOR.to_string(),
        }
    }
}

impl SpecDefaults {
    fn standard_tags(&self, mode: &AllocationMode) -> Tags {
        let mut tags = Tags::new();
        tags.insert("Environment".to_string(), self.environment.clone());
        tags.insert("Project".to_string(), self.project.clone());
        tags.insert("InstanceType".to_string(), mode.tag_value().to_string());
        tags
    }
}
