use std::path::PathBuf;

use clap::Parser;

use crate::client::globalsettings::GlobalSettings;
use crate::client::specfile::{sample_entries, write_sample};

#[derive(Parser)]
pub struct SampleOpts {
    /// Path of the created file
    #[arg(long, short, default_value = "sample_config.json", value_hint = clap::ValueHint::FilePath)]
    output: PathBuf,
}

pub fn command_sample(gsettings: &GlobalSettings, opts: SampleOpts) -> anyhow::Result<()> {
    write_sample(&opts.output)?;
    gsettings
        .printer()
        .print_sample_created(&opts.output, sample_entries().len());
    Ok(())
}
