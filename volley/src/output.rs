use crate::cli::OutputFormat;
use crate::exit_codes::ExitCode;
use std::time::Duration;

use volley_core::{AggregateListener, GeneratorInfo, Mode, RunSummary};

pub(crate) mod eta;
mod human;
mod json;

pub(crate) use eta::{Estimate, EtaTracker, write_eta_file};

/// State of the run at one poll of the loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame<'a> {
    pub elapsed: Duration,
    /// Present in generate mode only.
    pub estimate: Option<Estimate>,
    /// Autostop criteria currently accumulating a streak.
    pub counting: &'a [(String, f64)],
}

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, info: &GeneratorInfo, mode: &Mode);
    /// Subscriber for the per-second aggregate stream, if this format wants one.
    fn listener(&self) -> Option<Box<dyn AggregateListener>>;
    fn render(&self, frame: &Frame<'_>);
    fn print_summary(&self, summary: &RunSummary, exit: ExitCode) -> anyhow::Result<()>;
}

pub(crate) fn formatter(
    format: OutputFormat,
    info: &GeneratorInfo,
    buffered_seconds: usize,
) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => {
            Box::new(human::HumanReadableOutput::new(info, buffered_seconds))
        }
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
