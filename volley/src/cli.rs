use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use volley_core::ScheduleStep;

/// `RATE:DURATION`, e.g. `100:30s`.
fn parse_step(input: &str) -> Result<ScheduleStep, String> {
    let s = input.trim();
    let (rate, duration) = s
        .split_once(':')
        .ok_or_else(|| format!("invalid step '{s}' (expected RATE:DURATION, e.g. 100:30s)"))?;

    let rate: u64 = rate
        .trim()
        .parse()
        .map_err(|_| format!("invalid step rate in '{s}'"))?;
    let duration = humantime::parse_duration(duration.trim())
        .map_err(|e| format!("invalid step duration in '{s}': {e}"))?;
    if duration.is_zero() {
        return Err(format!("step duration in '{s}' must be positive"));
    }

    Ok(ScheduleStep::for_duration(rate, duration))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Per-second info widget and progress bar on stderr, summary on stdout.
    HumanReadable,
    /// Emit one JSON line per second plus a summary line (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "volley",
    author,
    version,
    about = "Drives a load generator and aggregates its results per second",
    long_about = "volley runs an external load generator, tails the phout result file and the stat log it writes, and turns them into a gap-free series of per-second aggregates annotated with the planned load.\n\nA previously recorded phout file can be replayed with `volley import`.",
    after_help = "Examples:\n  volley run load.yaml\n  volley run load.yaml --autostop 'instances(80%,10s)' --output json\n  volley import phout.txt --stat-log stat.log --instances 100 --step 100:30s"
)]
pub struct Cli {
    /// Log filter (e.g. `debug`, `volley_core=trace`); `RUST_LOG` is used when unset
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the generator described by a YAML config and aggregate its output
    Run(RunArgs),

    /// Aggregate an existing phout file without starting a generator
    Import(ImportArgs),
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    /// Stabilization window: seconds held back before a second is emitted
    #[arg(long, value_name = "SECONDS")]
    pub buffered_seconds: Option<usize>,

    /// Autostop criterion (repeatable), e.g. `instances(80%,10s)`
    #[arg(long = "autostop", value_name = "CRITERION")]
    pub autostop: Vec<String>,

    /// How often the result files are polled (e.g. 1s, 250ms)
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    pub poll_interval: Duration,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the run config (.yaml)
    pub config: PathBuf,

    /// Write the estimated seconds remaining to this file on every poll
    #[arg(long, value_name = "PATH")]
    pub eta_file: Option<PathBuf>,

    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Phout file to aggregate
    pub phout: PathBuf,

    /// Stat log with active instance counts
    #[arg(long, value_name = "PATH")]
    pub stat_log: Option<PathBuf>,

    /// Instance limit the results were produced with
    #[arg(long, default_value_t = 0)]
    pub instances: u64,

    /// Planned number of requests
    #[arg(long, default_value_t = 0)]
    pub ammo_count: u64,

    /// Planned load step (repeatable, RATE:DURATION)
    #[arg(long = "step", value_name = "RATE:DURATION", value_parser = parse_step)]
    pub steps: Vec<ScheduleStep>,

    #[command(flatten)]
    pub session: SessionArgs,
}
