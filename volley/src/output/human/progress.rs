use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Resolution of the test progress bar.
const BAR_LENGTH: u64 = 1000;

/// Stderr console: an optional test progress bar above a status line.
///
/// Both lines are created on first use, so imports never show a bar.
pub(crate) struct HumanProgress {
    multi: MultiProgress,
    lines: Mutex<Lines>,
}

#[derive(Default)]
struct Lines {
    bar: Option<ProgressBar>,
    status: Option<ProgressBar>,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        let multi = MultiProgress::new();
        multi.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
        Self {
            multi,
            lines: Mutex::new(Lines::default()),
        }
    }

    /// `ratio` is clamped to `0.0..=1.0`.
    pub(crate) fn set_progress(&self, ratio: f64, message: String) {
        let mut lines = self.lines();
        let bar = lines.bar.get_or_insert_with(|| {
            // Keep the bar above the status line if that one exists already.
            let pb = ProgressBar::new(BAR_LENGTH).with_style(bar_style());
            self.multi.insert(0, pb)
        });
        bar.set_position((ratio.clamp(0.0, 1.0) * BAR_LENGTH as f64) as u64);
        bar.set_message(message);
    }

    pub(crate) fn set_status(&self, message: String) {
        let mut lines = self.lines();
        let status = lines.status.get_or_insert_with(|| {
            let pb = self
                .multi
                .add(ProgressBar::new_spinner().with_style(spinner_style()));
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        });
        status.set_message(message);
    }

    /// Prints a line above the console without tearing it.
    pub(crate) fn println(&self, line: &str) {
        let _ = self.multi.println(line);
    }

    pub(crate) fn finish(&self) {
        let mut lines = self.lines();
        for pb in [lines.bar.take(), lines.status.take()].into_iter().flatten() {
            pb.finish_and_clear();
        }
        let _ = self.multi.clear();
    }

    fn lines(&self) -> MutexGuard<'_, Lines> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("progress [ {bar:30.green/cyan} ] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>~")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_created_on_first_use() {
        let console = HumanProgress::new();
        console.set_status("waiting for results".to_string());
        assert!(console.lines().bar.is_none());

        console.set_progress(1.5, "eta=0:00:00".to_string());
        let pos = console.lines().bar.as_ref().map(ProgressBar::position);
        assert_eq!(pos, Some(BAR_LENGTH));

        console.finish();
        let lines = console.lines();
        assert!(lines.bar.is_none() && lines.status.is_none());
    }
}
