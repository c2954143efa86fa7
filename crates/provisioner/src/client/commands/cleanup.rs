use anyhow::Context;

use crate::client::globalsettings::GlobalSettings;
use crate::client::output::outputs::NothingToCleanup;
use crate::provision::cleanup_all;
use crate::provision::report::{cleanup_candidates, load_report};

/// Terminates all resources that were successfully acquired by the run stored in the report.
pub async fn command_cleanup(gsettings: &GlobalSettings) -> anyhow::Result<()> {
    let report_path = gsettings.report_path();
    let results = load_report(report_path)
        .with_context(|| format!("Cannot load results from {}", report_path.display()))?;
    let Some(results) = results else {
        gsettings
            .printer()
            .print_nothing_to_cleanup(report_path, NothingToCleanup::MissingReport);
        return Ok(());
    };

    let ids = cleanup_candidates(&results);
    if ids.is_empty() {
        gsettings
            .printer()
            .print_nothing_to_cleanup(report_path, NothingToCleanup::NoResources);
        return Ok(());
    }

    let api = gsettings.resource_api();
    api.check_access()
        .await
        .context("Cannot access the resource API, check your credentials")?;
    let events = gsettings.event_streamer()?;

    let report = cleanup_all(api, ids, gsettings.workers(), &events).await;
    gsettings.printer().print_cleanup_report(&report);
    Ok(())
}
