use volley_core::{AggregateListener, SecondAggregate};

use super::format::{Highlight, format_clock, paint};

/// Last-second status line: load, accuracy and how far output trails real time.
#[derive(Debug, Clone, Default)]
pub(crate) struct InfoWidget {
    instance_limit: u64,
    instances: u64,
    planned: u64,
    /// Consecutive seconds the current planned value has held.
    planned_secs: u64,
    rps: u64,
    selfload: f64,
    last_second: Option<i64>,
}

impl InfoWidget {
    pub(crate) fn new(instance_limit: u64) -> Self {
        Self {
            instance_limit,
            ..Self::default()
        }
    }

    pub(crate) fn instances_highlight(&self) -> Highlight {
        if self.instance_limit == 0 {
            return Highlight::Plain;
        }
        let fraction = self.instances as f64 / self.instance_limit as f64;
        if fraction > 0.8 {
            Highlight::Alert
        } else if fraction > 0.5 {
            Highlight::Warn
        } else {
            Highlight::Plain
        }
    }

    pub(crate) fn rps_highlight(&self) -> Highlight {
        if self.rps == self.planned {
            Highlight::Plain
        } else {
            Highlight::Warn
        }
    }

    pub(crate) fn accuracy_highlight(&self) -> Highlight {
        if self.selfload < 80.0 {
            Highlight::Alert
        } else if self.selfload < 95.0 {
            Highlight::Warn
        } else {
            Highlight::Plain
        }
    }

    /// Seconds between `now` and the last emitted second.
    pub(crate) fn time_lag(&self, now_epoch: i64) -> Option<u64> {
        self.last_second
            .map(|s| u64::try_from(now_epoch.saturating_sub(s)).unwrap_or(0))
    }

    pub(crate) fn render(&self, now_epoch: i64, buffered_seconds: usize, colour: bool) -> String {
        let Some(lag) = self.time_lag(now_epoch) else {
            return "waiting for results".to_string();
        };

        let buffered = buffered_seconds as u64;
        let lag_highlight = if lag > buffered * 5 {
            Highlight::Alert
        } else if lag > buffered {
            Highlight::Warn
        } else {
            Highlight::Plain
        };

        format!(
            "instances={} planned={} for {} rps={} accuracy={}% lag={}",
            paint(
                &self.instances.to_string(),
                self.instances_highlight(),
                colour
            ),
            self.planned,
            format_clock(self.planned_secs),
            paint(&self.rps.to_string(), self.rps_highlight(), colour),
            paint(
                &format!("{:.2}", self.selfload),
                self.accuracy_highlight(),
                colour
            ),
            paint(&format_clock(lag), lag_highlight, colour),
        )
    }
}

impl AggregateListener for InfoWidget {
    fn on_second(&mut self, second: &SecondAggregate) {
        let o = &second.overall;
        self.instances = o.active_instances;
        if self.planned == o.planned_requests {
            self.planned_secs += 1;
        } else {
            self.planned = o.planned_requests;
            self.planned_secs = 1;
        }
        self.rps = o.rps;
        self.selfload = o.selfload;
        self.last_second = Some(second.timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn second(ts: i64, active: u64, planned: u64, rps: u64, selfload: f64) -> SecondAggregate {
        let mut s = SecondAggregate::zero(ts);
        s.overall.active_instances = active;
        s.overall.planned_requests = planned;
        s.overall.rps = rps;
        s.overall.selfload = selfload;
        s
    }

    #[test]
    fn instances_coloured_by_fraction_of_limit() {
        let mut w = InfoWidget::new(100);
        w.on_second(&second(1, 50, 0, 0, 100.0));
        assert_eq!(w.instances_highlight(), Highlight::Plain);
        w.on_second(&second(2, 51, 0, 0, 100.0));
        assert_eq!(w.instances_highlight(), Highlight::Warn);
        w.on_second(&second(3, 81, 0, 0, 100.0));
        assert_eq!(w.instances_highlight(), Highlight::Alert);

        let unlimited = InfoWidget::new(0);
        assert_eq!(unlimited.instances_highlight(), Highlight::Plain);
    }

    #[test]
    fn planned_duration_counts_repeats() {
        let mut w = InfoWidget::new(10);
        w.on_second(&second(1, 0, 100, 100, 99.0));
        w.on_second(&second(2, 0, 100, 97, 99.0));
        assert_eq!(w.planned_secs, 2);
        assert_eq!(w.rps_highlight(), Highlight::Warn);

        w.on_second(&second(3, 0, 50, 50, 99.0));
        assert_eq!(w.planned_secs, 1);
        assert_eq!(w.rps_highlight(), Highlight::Plain);
    }

    #[test]
    fn accuracy_thresholds() {
        let mut w = InfoWidget::new(10);
        w.on_second(&second(1, 0, 0, 0, 79.9));
        assert_eq!(w.accuracy_highlight(), Highlight::Alert);
        w.on_second(&second(2, 0, 0, 0, 94.0));
        assert_eq!(w.accuracy_highlight(), Highlight::Warn);
        w.on_second(&second(3, 0, 0, 0, 95.0));
        assert_eq!(w.accuracy_highlight(), Highlight::Plain);
    }

    #[test]
    fn render_shows_lag() {
        let mut w = InfoWidget::new(10);
        assert_eq!(w.render(100, 2, false), "waiting for results");

        w.on_second(&second(100, 3, 10, 10, 99.5));
        assert_eq!(w.time_lag(103), Some(3));
        assert_eq!(w.time_lag(90), Some(0));
        assert_eq!(
            w.render(103, 2, false),
            "instances=3 planned=10 for 0:00:01 rps=10 accuracy=99.50% lag=0:00:03"
        );
        assert!(w.render(103, 2, true).contains("\x1b[33m0:00:03"));
        assert!(w.render(111, 2, true).contains("\x1b[31m0:00:11"));
    }
}
