use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use crate::client::globalsettings::GlobalSettings;
use crate::client::specfile::load_specs;
use crate::provision::Provisioner;
use crate::provision::report::save_report;
use crate::provision::spec::{DEFAULT_CREATOR, DEFAULT_IMAGE, SpecDefaults};

#[derive(Parser)]
pub struct RunOpts {
    /// Path to a JSON file with resource definitions
    ///
    /// The file contains an array of entries, see `provision sample` for an example.
    #[arg(long, short, value_hint = clap::ValueHint::FilePath)]
    config: PathBuf,

    /// Image used for resources that do not specify `image_id`
    #[arg(long, default_value = DEFAULT_IMAGE)]
    default_image: String,

    /// `Environment` tag of resources that do not specify any tags
    #[arg(long, default_value = "Development")]
    environment: String,

    /// `Project` tag of resources that do not specify any tags
    #[arg(long, default_value = "AutoProvisioned")]
    project: String,

    /// Value of the `CreatedBy` tag attached to every resource
    #[arg(long, default_value = DEFAULT_CREATOR)]
    created_by: String,
}

impl RunOpts {
    fn spec_defaults(&self) -> SpecDefaults {
        SpecDefaults {
            image: self.default_image.clone(),
            environment: self.environment.clone(),
            project: self.project.clone(),
            creator: self.created_by.clone(),
        }
    }
}

pub async fn command_run(gsettings: &GlobalSettings, opts: RunOpts) -> anyhow::Result<()> {
    let specs = load_specs(&opts.config)?;
    log::info!(
        "Loaded {} resource definition(s) from {}",
        specs.len(),
        opts.config.display()
    );

    let api = gsettings.resource_api();
    api.check_access()
        .await
        .context("Cannot access the resource API, check your credentials")?;
    let events = gsettings.event_streamer()?;

    let provisioner = Provisioner::new(api, opts.spec_defaults(), events, gsettings.workers());
    let report = provisioner.acquire_all(specs).await;

    let report_path = gsettings.report_path();
    save_report(report_path, &report.results)
        .with_context(|| format!("Cannot save results into {}", report_path.display()))?;
    gsettings
        .printer()
        .print_provisioning_report(&report, report_path);
    Ok(())
}
