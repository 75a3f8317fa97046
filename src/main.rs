use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use hvscan::config::RunOverrides;
use hvscan::data::parse_time;
use hvscan::manager::Manager;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    run_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

// Run settings shared by every analysis.
#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    station: Option<u32>,

    #[arg(long, value_parser = parse_time)]
    start: Option<NaiveDateTime>,

    #[arg(long, value_parser = parse_time)]
    end: Option<NaiveDateTime>,

    #[arg(long)]
    reduced_field: Option<bool>,
}

impl RunArgs {
    fn overrides(self, hv_step: Option<f64>) -> RunOverrides {
        RunOverrides {
            station: self.station,
            start: self.start,
            end: self.end,
            reduced_field: self.reduced_field,
            hv_step,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bin the metrics against the (reduced) high voltage.
    Scan {
        #[command(flatten)]
        run: RunArgs,

        #[arg(long)]
        hv_step: Option<f64>,
    },

    /// Average the columns over fixed time windows.
    Timeline {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Remove the analysis outputs.
    Clean,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mut mgr = Manager::new(args.run_dir).context("failed to construct mgr")?;

    match args.command {
        Command::Scan { run, hv_step } => mgr.run_scan(&run.overrides(hv_step))?,
        Command::Timeline { run } => mgr.run_timeline(&run.overrides(None))?,
        Command::Clean => mgr.clean_outputs()?,
    }

    Ok(())
}
