use std::path::PathBuf;

use clap::Parser;
use clap_complete::Shell;

use crate::client::commands::run::RunOpts;
use crate::client::commands::sample::SampleOpts;
use crate::client::output::outputs::Outputs;
use crate::common::utils::time::ArgDuration;
use crate::provision::DEFAULT_CONCURRENCY;
use crate::provision::api::aws::DEFAULT_REGION;

pub const DEFAULT_REPORT_PATH: &str = "provisioning_results.json";

#[derive(clap::ValueEnum, Clone)]
pub enum ColorPolicy {
    /// Use colors if the stdout is detected to be a terminal.
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

fn parse_workers(value: &str) -> anyhow::Result<usize> {
    let workers: usize = value.parse()?;
    if workers == 0 {
        anyhow::bail!("at least one worker is required");
    }
    Ok(workers)
}

// Common CLI options
#[derive(Parser)]
pub struct CommonOpts {
    /// Region in which resources are provisioned
    #[arg(
        long,
        short,
        env = "PROVISIONER_REGION",
        default_value = DEFAULT_REGION,
        global = true,
        help_heading("GLOBAL OPTIONS")
    )]
    pub region: String,

    /// Maximum number of resources provisioned (or terminated) at the same time
    #[arg(
        long,
        short,
        env = "PROVISIONER_WORKERS",
        default_value_t = DEFAULT_CONCURRENCY,
        value_parser = parse_workers,
        global = true,
        help_heading("GLOBAL OPTIONS")
    )]
    pub workers: usize,

    /// Path of the results file written by `run` and read by `cleanup`
    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        env = "PROVISIONER_REPORT",
        default_value = DEFAULT_REPORT_PATH,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub report: PathBuf,

    /// Appends provisioning events as JSON lines into the given file
    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        env = "PROVISIONER_EVENT_LOG",
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub event_log: Option<PathBuf>,

    /// Path to the `aws` command line tool
    #[arg(
        long,
        value_hint = clap::ValueHint::ExecutablePath,
        env = "PROVISIONER_AWS_PROGRAM",
        default_value = "aws",
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub aws_program: PathBuf,

    /// How long to wait for a request to be fulfilled or for a resource to start
    #[arg(
        long,
        default_value = "15m",
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub wait_timeout: ArgDuration,

    /// Sets console color policy
    #[arg(
        long,
        default_value_t = ColorPolicy::Auto,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub colors: ColorPolicy,

    /// Sets output formatting
    #[arg(
        long,
        env = "PROVISIONER_OUTPUT_MODE",
        default_value_t = Outputs::CLI,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub output_mode: Outputs,

    /// Enables more detailed log output
    #[arg(
        long,
        env = "PROVISIONER_DEBUG",
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub debug: bool,
}

// Root CLI options
#[derive(Parser)]
#[command(
    author,
    about,
    version(crate::PROVISIONER_VERSION),
    disable_help_subcommand(true),
    help_expected(true)
)]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Parser)]
pub enum SubCommand {
    /// Provision resources described in a resource file
    Run(RunOpts),
    /// Terminate resources acquired by the previous run
    Cleanup,
    /// Create a sample resource file
    Sample(SampleOpts),
    /// Generate shell completion script
    GenerateCompletion(GenerateCompletionOpts),
}

#[derive(Parser)]
pub struct GenerateCompletionOpts {
    /// Shell flavour for which the completion script should be generated
    #[arg(value_enum)]
    pub shell: Shell,
}
