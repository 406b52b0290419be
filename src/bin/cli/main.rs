use std::path::PathBuf;

use clap::Parser;
use tracing::error;

mod groups;
mod report;

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a JSON config file. Defaults to `fleetscore.json` in the
    /// working directory if it exists, otherwise the built-in settings.
    #[arg(long, global = true, env = "FLEETSCORE_CONFIG")]
    config: Option<PathBuf>,

    /// The command to perform.
    #[command(subcommand)]
    command: Subcommand,
}

fn main() {
    // set up tracing
    tracing_subscriber::fmt::init();

    let CliArgs { config, command } = CliArgs::parse();

    let result = match command {
        Subcommand::Groups(args) => groups::main(config.as_deref(), args),
        Subcommand::Report(args) => report::main(config.as_deref(), args),
    };
    if let Err(err) = result {
        if let Some(cli_err) = err.downcast_ref::<clap::Error>() {
            cli_err.exit();
        } else {
            error!("error during execution: {:#}", err);
            std::process::exit(1);
        }
    }
}

#[derive(clap::Subcommand, Debug)]
pub enum Subcommand {
    /// List the vehicle groups in the group directory.
    Groups(groups::Args),
    /// Generate the monthly utilization and driver scoring report for a
    /// vehicle group.
    Report(report::Args),
}
