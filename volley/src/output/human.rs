use std::io::IsTerminal as _;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

mod format;
mod progress;
mod summary;
mod widget;

use format::{format_clock, format_percent};
use progress::HumanProgress;
use summary::render;
use widget::InfoWidget;

use volley_core::{AggregateListener, GeneratorInfo, Mode, RunSummary};

use super::{Frame, OutputFormatter};
use crate::exit_codes::ExitCode;

pub(crate) struct HumanReadableOutput {
    progress: HumanProgress,
    widget: Arc<Mutex<InfoWidget>>,
    buffered_seconds: usize,
    colour: bool,
}

impl HumanReadableOutput {
    pub(crate) fn new(info: &GeneratorInfo, buffered_seconds: usize) -> Self {
        Self {
            progress: HumanProgress::new(),
            widget: Arc::new(Mutex::new(InfoWidget::new(info.instances))),
            buffered_seconds,
            colour: std::io::stderr().is_terminal(),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, info: &GeneratorInfo, mode: &Mode) {
        match mode {
            Mode::Generate { program, config } => {
                println!("generator: {} {}", program.display(), config.display());
            }
            Mode::Import => println!("import: {}", info.phout_file.display()),
        }
        if let Some(address) = &info.address {
            match info.port {
                Some(port) => println!("target: {address}:{port}"),
                None => println!("target: {address}"),
            }
        }
        if let Some(ammo) = &info.ammo_file {
            println!("ammo: {}", ammo.display());
        }
        if info.ammo_count > 0 {
            println!("count: {}", info.ammo_count);
        }
        if !info.steps.is_empty() {
            println!("load: {}", info.schedule_label());
        }
        if info.instances > 0 {
            println!("instances: {}", info.instances);
        }
        println!();
    }

    fn listener(&self) -> Option<Box<dyn AggregateListener>> {
        Some(Box::new(self.widget.clone()))
    }

    fn render(&self, frame: &Frame<'_>) {
        if let Some(estimate) = &frame.estimate {
            let eta = estimate
                .eta_secs
                .map_or_else(|| "n/a".to_string(), format_clock);
            self.progress.set_progress(
                estimate.progress,
                format!(
                    "duration={} eta={eta}",
                    format_clock(frame.elapsed.as_secs())
                ),
            );
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);
        let mut line = self
            .widget
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .render(now, self.buffered_seconds, self.colour);

        for (label, fraction) in frame.counting {
            line.push_str(&format!(" | {label} ({})", format_percent(*fraction)));
        }
        self.progress.set_status(line);
    }

    fn print_summary(&self, summary: &RunSummary, exit: ExitCode) -> anyhow::Result<()> {
        if let Some(d) = &summary.autostop {
            self.progress.println(&format!("autostop: {}", d.reason));
        }
        self.progress.finish();
        print!("{}", render(summary, exit));
        Ok(())
    }
}
