use std::path::Path;

use crate::client::output::outputs::{NothingToCleanup, Output};
use crate::provision::{CleanupReport, ProvisioningReport};

#[derive(Default)]
pub struct Quiet;

impl Output for Quiet {
    fn print_provisioning_report(&self, report: &ProvisioningReport, _report_path: &Path) {
        for result in &report.results {
            match result.resource_id() {
                Some(id) => println!("{} SUCCESS {id}", result.name),
                None => println!("{} FAILED", result.name),
            }
        }
    }

    fn print_cleanup_report(&self, report: &CleanupReport) {
        for (id, success) in report {
            println!("{id} {}", if *success { "TERMINATED" } else { "FAILED" });
        }
    }

    fn print_nothing_to_cleanup(&self, _report_path: &Path, _reason: NothingToCleanup) {}

    fn print_sample_created(&self, path: &Path, _entries: usize) {
        println!("{}", path.display());
    }

    fn print_error(&self, error: anyhow::Error) {
        eprintln!("{error:?}");
    }
}
