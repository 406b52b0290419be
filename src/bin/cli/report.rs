use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context as _};
use clap::CommandFactory as _;
use fleetscore::{
    apis::telematics::TelematicsClient,
    config::Config,
    groups,
    period::Period,
    tools::fleet_report::{self, output},
    utils,
};
use tracing::{info, warn};

use crate::CliArgs;

#[derive(clap::Args, Debug)]
pub struct Args {
    /// The vehicle group to report on, by display name or numeric id.
    #[arg(short, long)]
    group: String,

    /// The month to report on. Valid options are "this-month", "last-month",
    /// a month of the form "%Y-%m", or any date "%Y-%m-%d" within the month.
    #[arg(long, default_value = "last-month")]
    month: String,

    /// The format in which to print the output.
    #[arg(long, value_enum, default_value = "xlsx")]
    format: CliOutputFormat,

    /// Where to write the output. With `--format xlsx` this is the workbook
    /// path and defaults to "<group>_Report.xlsx". Otherwise "-" or
    /// unspecified writes to stdout.
    #[arg(short, long, default_value = None)]
    output: Option<PathBuf>,

    /// Only valid with `--format xlsx`. Open the workbook once it is written.
    #[arg(long)]
    open: bool,
}

#[derive(Debug, clap::ValueEnum, Clone, Copy, Eq, PartialEq)]
enum CliOutputFormat {
    /// Writes the four-sheet workbook (utilization, eco driving, trips,
    /// scoring).
    Xlsx,
    /// Prints a human-readable summary.
    Human,
    /// Prints the scoring table as CSV.
    Csv,
}

pub fn main(config: Option<&Path>, args: Args) -> anyhow::Result<()> {
    let Args { group, month, format, output, open } = args;

    if format != CliOutputFormat::Xlsx && open {
        let err = CliArgs::command().error(
            clap::error::ErrorKind::ArgumentConflict,
            "The `--open` option can only be used with `--format xlsx`",
        );
        bail!(err);
    }
    let period = match Period::parse_month(&month) {
        Ok(period) => period,
        Err(e) => {
            let err = CliArgs::command().error(clap::error::ErrorKind::InvalidValue, e.to_string());
            bail!(err);
        }
    };

    let config = Config::load(config)?;
    let tz = config.time_zone()?;
    let directory = groups::load_group_directory(&config.group_directory, &config.group_directory_sheet)?;
    let Some(group) = groups::find_group(&directory, &group) else {
        bail!("no vehicle group named \"{}\" in {}", group, config.group_directory.display());
    };

    let client = TelematicsClient::connect(&config).context("could not connect to the telemetry service")?;
    let report = fleet_report::build_fleet_report(&client, group, period, &tz)?;
    for warning in report.warnings() {
        warn!("{}", warning);
    }

    match format {
        CliOutputFormat::Xlsx => {
            let path = output.unwrap_or_else(|| PathBuf::from(output::report_file_name(&group.name)));
            let bytes = output::xlsx::compose(&report)?;
            std::fs::write(&path, bytes).with_context(|| format!("could not write {}", path.display()))?;
            info!("wrote report to {}", path.display());
            if open {
                utils::open_path(&path);
            }
        }
        CliOutputFormat::Human => {
            let mut writer = output_writer(output.as_deref())?;
            output::human::print_report(&report, &mut writer)?;
            writer.flush()?;
        }
        CliOutputFormat::Csv => {
            let mut writer = output_writer(output.as_deref())?;
            output::csv::print_scores(&report, &mut writer)?;
            writer.flush()?;
        }
    }
    Ok(())
}

fn output_writer(output: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) if path != Path::new("-") => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("could not create {}", path.display()))?,
        )),
        _ => Box::new(std::io::stdout()),
    })
}
