use std::path::Path;

use cli_table::format::Separator;
use cli_table::{Cell, CellStruct, Color, ColorChoice, Style, Table, TableStruct, print_stdout};
use colored::Colorize;

use crate::client::output::outputs::{NothingToCleanup, Output};
use crate::provision::{CleanupReport, ProvisioningOutcome, ProvisioningReport};

const STATUS_COLOR_SUCCESS: Color = Color::Green;
const STATUS_COLOR_FAILED: Color = Color::Red;

pub struct CliOutput {
    color_policy: ColorChoice,
}

impl CliOutput {
    pub fn new(color_policy: ColorChoice) -> CliOutput {
        CliOutput { color_policy }
    }

    fn print_horizontal_table(&self, rows: Vec<Vec<CellStruct>>, header: Vec<CellStruct>) {
        let table = rows
            .table()
            .separator(
                Separator::builder()
                    .title(Some(Default::default()))
                    .column(Some(Default::default()))
                    .build(),
            )
            .title(header);
        self.print_table(table);
    }

    fn print_table(&self, table: TableStruct) {
        let table = table.color_choice(self.color_policy);
        if let Err(e) = print_stdout(table) {
            log::error!("Cannot print table to stdout: {e:?}");
        }
    }
}

fn status_cell(success: bool) -> CellStruct {
    if success {
        "SUCCESS"
            .cell()
            .foreground_color(Some(STATUS_COLOR_SUCCESS))
    } else {
        "FAILED".cell().foreground_color(Some(STATUS_COLOR_FAILED))
    }
}

fn optional_cell(value: Option<&str>) -> CellStruct {
    value.unwrap_or("").cell()
}

impl Output for CliOutput {
    fn print_provisioning_report(&self, report: &ProvisioningReport, report_path: &Path) {
        let mut results: Vec<_> = report.results.iter().collect();
        results.sort_unstable_by(|a, b| a.name.cmp(&b.name));

        let rows: Vec<_> = results
            .into_iter()
            .map(|result| match &result.outcome {
                ProvisioningOutcome::Success {
                    resource_id,
                    public_address,
                    private_address,
                    allocation,
                    warnings,
                    ..
                } => vec![
                    result.name.as_str().cell(),
                    status_cell(true),
                    resource_id.as_str().cell(),
                    optional_cell(public_address.as_deref()),
                    optional_cell(private_address.as_deref()),
                    allocation.as_str().cell(),
                    result.attempts.cell(),
                    warnings.join("\n").cell(),
                ],
                ProvisioningOutcome::Failed { error } => vec![
                    result.name.as_str().cell(),
                    status_cell(false),
                    "".cell(),
                    "".cell(),
                    "".cell(),
                    "".cell(),
                    result.attempts.cell(),
                    error.as_str().cell(),
                ],
            })
            .collect();

        let header = vec![
            "Name".cell().bold(true),
            "Status".cell().bold(true),
            "Resource".cell().bold(true),
            "Public address".cell().bold(true),
            "Private address".cell().bold(true),
            "Allocation".cell().bold(true),
            "Attempts".cell().bold(true),
            "Details".cell().bold(true),
        ];
        self.print_horizontal_table(rows, header);

        let summary = &report.summary;
        let counts = format!(
            "{} succeeded, {} failed",
            summary.succeeded, summary.failed
        );
        let counts = if summary.failed == 0 {
            counts.green()
        } else {
            counts.red()
        };
        println!(
            "Provisioned {} of {} resource(s): {counts}",
            summary.succeeded,
            summary.total()
        );
        println!("Results saved to {}", report_path.display());
    }

    fn print_cleanup_report(&self, report: &CleanupReport) {
        let rows: Vec<_> = report
            .iter()
            .map(|(id, success)| {
                let status = if *success {
                    "TERMINATED".cell().foreground_color(Some(STATUS_COLOR_SUCCESS))
                } else {
                    "FAILED".cell().foreground_color(Some(STATUS_COLOR_FAILED))
                };
                vec![id.as_str().cell(), status]
            })
            .collect();
        let header = vec!["Resource".cell().bold(true), "Status".cell().bold(true)];
        self.print_horizontal_table(rows, header);

        let failed = report.values().filter(|success| !**success).count();
        if failed > 0 {
            println!(
                "{}",
                format!("{failed} resource(s) could not be terminated").red()
            );
        }
    }

    fn print_nothing_to_cleanup(&self, report_path: &Path, reason: NothingToCleanup) {
        match reason {
            NothingToCleanup::MissingReport => {
                println!(
                    "No previous provisioning results found at {}",
                    report_path.display()
                )
            }
            NothingToCleanup::NoResources => println!("No resources to clean up"),
        }
    }

    fn print_sample_created(&self, path: &Path, entries: usize) {
        println!(
            "Sample resource file with {entries} entries created at {}",
            path.display()
        );
    }

    fn print_error(&self, error: anyhow::Error) {
        eprintln!("{error:?}");
    }
}
