use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::common::utils::fs::write_atomically;
use crate::provision::spec::{
    AllocationMode, DEFAULT_VOLUME_CLASS, DEFAULT_VOLUME_SIZE_GB, ProvisionalOptions,
    ResourceSpec, Tags, VolumeSpec,
};
use crate::provision::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};

/// Single entry of a resource definition file. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecEntry {
    pub instance_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_group_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default = "default_volume_size", skip_serializing_if = "is_default_volume_size")]
    pub volume_size: u32,
    #[serde(default = "default_volume_type", skip_serializing_if = "is_default_volume_type")]
    pub volume_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam_instance_profile: Option<String>,
    #[serde(default = "default_spot_instance", skip_serializing_if = "is_spot")]
    pub spot_instance: bool,
    /// Maximum hourly price, e.g. `"0.05"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_max_price: Option<SpotPrice>,
    #[serde(default = "default_spot_max_retries", skip_serializing_if = "is_default_retries")]
    pub spot_max_retries: u32,
    /// Initial delay between attempts in seconds.
    #[serde(default = "default_spot_retry_delay", skip_serializing_if = "is_default_delay")]
    pub spot_retry_delay: f64,
}

/// Price can be written both as a string and as a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpotPrice {
    Text(String),
    Number(f64),
}

impl SpotPrice {
    fn into_string(self) -> String {
        match self {
            SpotPrice::Text(price) => price,
            SpotPrice::Number(price) => price.to_string(),
        }
    }
}

fn default_volume_size() -> u32 {
    DEFAULT_VOLUME_SIZE_GB
}
fn is_default_volume_size(value: &u32) -> bool {
    *value == DEFAULT_VOLUME_SIZE_GB
}
fn default_volume_type() -> String {
    DEFAULT_VOLUME_CLASS.to_string()
}
#[allow(clippy::ptr_arg)]
fn is_default_volume_type(value: &String) -> bool {
    value == DEFAULT_VOLUME_CLASS
}
fn default_spot_instance() -> bool {
    true
}
fn is_spot(value: &bool) -> bool {
    *value
}
fn default_spot_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn is_default_retries(value: &u32) -> bool {
    *value == DEFAULT_MAX_RETRIES
}
fn default_spot_retry_delay() -> f64 {
    DEFAULT_RETRY_DELAY.as_secs_f64()
}
fn is_default_delay(value: &f64) -> bool {
    *value == DEFAULT_RETRY_DELAY.as_secs_f64()
}

impl SpecEntry {
    pub fn new<S: Into<String>>(instance_type: S) -> Self {
        Self {
            instance_type: instance_type.into(),
            name: None,
            image_id: None,
            key_name: None,
            security_group_ids: None,
            subnet_id: None,
            user_data: None,
            tags: None,
            volume_size: default_volume_size(),
            volume_type: default_volume_type(),
            iam_instance_profile: None,
            spot_instance: default_spot_instance(),
            spot_max_price: None,
            spot_max_retries: default_spot_max_retries(),
            spot_retry_delay: default_spot_retry_delay(),
        }
    }

    pub fn into_spec(self) -> anyhow::Result<ResourceSpec> {
        let mode = if self.spot_instance {
            let retry_delay = Duration::try_from_secs_f64(self.spot_retry_delay)
                .with_context(|| format!("Invalid spot_retry_delay {}", self.spot_retry_delay))?;
            AllocationMode::Provisional(ProvisionalOptions {
                max_price: self.spot_max_price.map(SpotPrice::into_string),
                max_retries: self.spot_max_retries,
                retry_delay,
            })
        } else {
            AllocationMode::Guaranteed
        };
        Ok(ResourceSpec {
            kind: self.instance_type,
            name: self.name,
            image: self.image_id,
            key_name: self.key_name,
            security_groups: self.security_group_ids.unwrap_or_default(),
            subnet: self.subnet_id,
            instance_profile: self.iam_instance_profile,
            volume: VolumeSpec {
                size_gb: self.volume_size,
                class: self.volume_type,
            },
            user_data: self.user_data,
            tags: self.tags,
            mode,
        })
    }
}

/// Loads resource specs from a JSON file containing an array of [`SpecEntry`].
pub fn load_specs(path: &Path) -> anyhow::Result<Vec<ResourceSpec>> {
    let content = std::fs::read(path)
        .with_context(|| format!("Cannot read resource file {}", path.display()))?;
    parse_specs(&content)
        .with_context(|| format!("Failed to load resources from {}", path.display()))
}

fn parse_specs(content: &[u8]) -> anyhow::Result<Vec<ResourceSpec>> {
    let entries: Vec<SpecEntry> = serde_json::from_slice(content)?;
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            entry
                .into_spec()
                .with_context(|| format!("Invalid entry #{index}"))
        })
        .collect()
}

pub fn sample_entries() -> Vec<SpecEntry> {
    let mut named = SpecEntry::new("t3.small");
    named.name = Some("custom-name".to_string());
    let mut on_demand = SpecEntry::new("t3.medium");
    on_demand.spot_instance = false;
    vec![SpecEntry::new("t3.micro"), named, on_demand]
}

pub fn write_sample(path: &Path) -> anyhow::Result<()> {
    let content = serde_json::to_vec_pretty(&sample_entries())?;
    write_atomically(path, &content)
        .with_context(|| format!("Cannot write sample file {}", path.display()))?;
    Ok(())
}
