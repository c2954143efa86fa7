use std::path::Path;

use crate::provision::{CleanupReport, ProvisioningReport};

#[allow(clippy::upper_case_acronyms)]
#[derive(clap::ValueEnum, Clone)]
pub enum Outputs {
    CLI,
    JSON,
    Quiet,
}

/// Why a cleanup pass had nothing to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NothingToCleanup {
    /// The report of a previous run does not exist.
    MissingReport,
    /// The report exists, but it contains no successfully acquired resource.
    NoResources,
}

pub trait Output {
    // Provisioning
    fn print_provisioning_report(&self, report: &ProvisioningReport, report_path: &Path);

    // Cleanup
    fn print_cleanup_report(&self, report: &CleanupReport);
    fn print_nothing_to_cleanup(&self, report_path: &Path, reason: NothingToCleanup);

    // Resource definitions
    fn print_sample_created(&self, path: &Path, entries: usize);

    // Errors
    fn print_error(&self, error: anyhow::Error);
}
