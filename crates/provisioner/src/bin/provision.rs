use std::io;
use std::io::IsTerminal;

use clap::{CommandFactory, FromArgMatches};
use clap_complete::generate;
use cli_table::ColorChoice;

use provisioner::client::commands::cleanup::command_cleanup;
use provisioner::client::commands::run::command_run;
use provisioner::client::commands::sample::command_sample;
use provisioner::client::globalsettings::GlobalSettings;
use provisioner::client::output::cli::CliOutput;
use provisioner::client::output::json::JsonOutput;
use provisioner::client::output::outputs::{Output, Outputs};
use provisioner::client::output::quiet::Quiet;
use provisioner::common::cli::{
    ColorPolicy, CommonOpts, GenerateCompletionOpts, RootOptions, SubCommand,
};
use provisioner::common::setup::setup_logging;
use provisioner::common::utils::fs::absolute_path;
use provisioner::provision::api::aws::AwsCliConfig;

fn make_global_settings(opts: CommonOpts) -> GlobalSettings {
    let color_policy = match opts.colors {
        ColorPolicy::Always => ColorChoice::AlwaysAnsi,
        ColorPolicy::Auto => {
            if io::stdout().is_terminal() {
                ColorChoice::Auto
            } else {
                ColorChoice::Never
            }
        }
        ColorPolicy::Never => ColorChoice::Never,
    };

    // Create Printer
    let printer: Box<dyn Output> = match opts.output_mode {
        Outputs::CLI => {
            // Make `colored` follow the same policy as the tables
            match color_policy {
                ColorChoice::Always | ColorChoice::AlwaysAnsi => {
                    colored::control::set_override(true)
                }
                ColorChoice::Never => colored::control::set_override(false),
                _ => {}
            }

            Box::new(CliOutput::new(color_policy))
        }
        Outputs::JSON => Box::<JsonOutput>::default(),
        Outputs::Quiet => Box::<Quiet>::default(),
    };

    let api_config = AwsCliConfig {
        program: opts.aws_program,
        region: opts.region,
        wait_timeout: opts.wait_timeout.unpack(),
    };

    GlobalSettings::new(
        api_config,
        opts.workers,
        absolute_path(opts.report),
        opts.event_log.map(absolute_path),
        printer,
    )
}

fn generate_completion(opts: GenerateCompletionOpts) -> anyhow::Result<()> {
    let generator = opts.shell;

    let mut app = RootOptions::command();
    eprintln!("Generating completion file for {generator}...");
    generate(generator, &mut app, "provision".to_string(), &mut io::stdout());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> provisioner::Result<()> {
    let matches = RootOptions::command().get_matches();
    let top_opts = match RootOptions::from_arg_matches(&matches) {
        Ok(opts) => opts,
        Err(error) => error.exit(),
    };

    setup_logging(top_opts.common.debug);

    let gsettings = make_global_settings(top_opts.common);

    let result = match top_opts.subcmd {
        SubCommand::Run(opts) => command_run(&gsettings, opts).await,
        SubCommand::Cleanup => command_cleanup(&gsettings).await,
        SubCommand::Sample(opts) => command_sample(&gsettings, opts),
        SubCommand::GenerateCompletion(opts) => generate_completion(opts),
    };

    if let Err(e) = result {
        gsettings.printer().print_error(e);
        std::process::exit(1);
    }

    Ok(())
}
