use std::path::Path;

use serde_json::json;

use crate::client::output::outputs::{NothingToCleanup, Output};
use crate::provision::{CleanupReport, ProvisioningReport};

#[derive(Default)]
pub struct JsonOutput;

impl JsonOutput {
    fn print(&self, data: serde_json::Value) {
        match serde_json::to_string_pretty(&data) {
            Ok(text) => println!("{text}"),
            Err(error) => log::error!("Cannot serialize output: {error}"),
        }
    }
}

impl Output for JsonOutput {
    fn print_provisioning_report(&self, report: &ProvisioningReport, report_path: &Path) {
        self.print(json!({
            "results": report.results,
            "summary": report.summary,
            "report": report_path.display().to_string(),
        }));
    }

    fn print_cleanup_report(&self, report: &CleanupReport) {
        self.print(json!(report));
    }

    fn print_nothing_to_cleanup(&self, report_path: &Path, reason: NothingToCleanup) {
        let reason = match reason {
            NothingToCleanup::MissingReport => "missing-report",
            NothingToCleanup::NoResources => "no-resources",
        };
        self.print(json!({
            "report": report_path.display().to_string(),
            "terminated": {},
            "reason": reason,
        }));
    }

    fn print_sample_created(&self, path: &Path, entries: usize) {
        self.print(json!({
            "path": path.display().to_string(),
            "entries": entries,
        }));
    }

    fn print_error(&self, error: anyhow::Error) {
        self.print(json!({
            "error": format!("{error:?}"),
        }));
    }
}
