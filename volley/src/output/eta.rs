use anyhow::Context as _;
use std::path::Path;
use std::time::Duration;

use volley_core::{AggregateListener, GeneratorInfo, SecondAggregate};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Estimate {
    /// `0.0..=1.0`.
    pub progress: f64,
    pub eta_secs: Option<u64>,
    /// Whether the estimate comes from the planned duration rather than ammo.
    pub by_duration: bool,
}

/// Counts processed ammo and estimates how much of the test is left.
#[derive(Debug, Clone)]
pub(crate) struct EtaTracker {
    duration_secs: u64,
    ammo_count: u64,
    processed: u64,
}

impl EtaTracker {
    pub(crate) fn new(info: &GeneratorInfo) -> Self {
        Self {
            duration_secs: info.duration.map_or(0, |d| d.as_secs()),
            ammo_count: info.ammo_count,
            processed: 0,
        }
    }

    /// Planned duration wins while it has not been exceeded; after that the
    /// processed/planned ammo ratio extrapolates the remaining time.
    pub(crate) fn estimate(&self, elapsed: Duration) -> Estimate {
        let elapsed = elapsed.as_secs();

        if self.duration_secs > 0 && self.duration_secs >= elapsed {
            return Estimate {
                progress: elapsed as f64 / self.duration_secs as f64,
                eta_secs: Some(self.duration_secs - elapsed),
                by_duration: true,
            };
        }

        if self.processed > 0 && self.ammo_count > 0 {
            let left = self.ammo_count.saturating_sub(self.processed);
            let eta = elapsed as f64 / self.processed as f64 * left as f64;
            return Estimate {
                progress: (self.processed as f64 / self.ammo_count as f64).min(1.0),
                eta_secs: Some(eta as u64),
                by_duration: false,
            };
        }

        Estimate {
            progress: 0.0,
            eta_secs: None,
            by_duration: false,
        }
    }
}

impl AggregateListener for EtaTracker {
    fn on_second(&mut self, second: &SecondAggregate) {
        self.processed += second.overall.rps;
    }
}

/// Rewrites `path` with the remaining seconds, `-1` when unknown.
pub(crate) async fn write_eta_file(path: &Path, eta_secs: Option<u64>) -> anyhow::Result<()> {
    let text = eta_secs.map_or_else(|| "-1".to_string(), |s| s.to_string());
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("failed to write eta file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(duration: Option<u64>, ammo: u64) -> EtaTracker {
        EtaTracker::new(&GeneratorInfo {
            duration: duration.map(Duration::from_secs),
            ammo_count: ammo,
            ..GeneratorInfo::default()
        })
    }

    fn feed(t: &mut EtaTracker, rps: u64) {
        let mut s = SecondAggregate::zero(1);
        s.overall.rps = rps;
        t.on_second(&s);
    }

    #[test]
    fn duration_drives_estimate_until_exceeded() {
        let t = tracker(Some(100), 0);
        let e = t.estimate(Duration::from_secs(25));
        assert_eq!(e.eta_secs, Some(75));
        assert!((e.progress - 0.25).abs() < 1e-9);
        assert!(e.by_duration);

        let over = t.estimate(Duration::from_secs(101));
        assert_eq!(over.eta_secs, None);
        assert_eq!(over.progress, 0.0);
    }

    #[test]
    fn ammo_drives_estimate_without_duration() {
        let mut t = tracker(None, 1000);
        assert_eq!(t.estimate(Duration::from_secs(10)).eta_secs, None);

        feed(&mut t, 150);
        feed(&mut t, 100);
        let e = t.estimate(Duration::from_secs(10));
        // 250 done in 10s, 750 left
        assert_eq!(e.eta_secs, Some(30));
        assert!((e.progress - 0.25).abs() < 1e-9);
        assert!(!e.by_duration);
    }

    #[test]
    fn overshooting_ammo_is_capped() {
        let mut t = tracker(None, 10);
        feed(&mut t, 20);
        let e = t.estimate(Duration::from_secs(4));
        assert_eq!(e.eta_secs, Some(0));
        assert_eq!(e.progress, 1.0);
    }

    #[tokio::test]
    async fn eta_file_holds_seconds_or_minus_one() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("eta.txt");

        write_eta_file(&path, Some(42)).await?;
        assert_eq!(std::fs::read_to_string(&path)?, "42");

        write_eta_file(&path, None).await?;
        assert_eq!(std::fs::read_to_string(&path)?, "-1");
        Ok(())
    }
}
