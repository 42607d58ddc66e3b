use tracing::{debug, warn};

use crate::aggregate::SecondAggregate;

/// Inserts zero seconds so the emitted stream advances exactly one second at a time.
///
/// Missing seconds are produced one per [`GapFiller::next_second`] call while the
/// real second that follows the gap stays held, so a gap costs no memory.
#[derive(Debug, Default)]
pub struct GapFiller {
    last_emitted: Option<i64>,
    held: Option<SecondAggregate>,
}

impl GapFiller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_emitted(&self) -> Option<i64> {
        self.last_emitted
    }

    /// True when no real second is waiting behind a gap.
    pub fn is_idle(&self) -> bool {
        self.held.is_none()
    }

    /// Queues `next` for emission. Call only while [`GapFiller::is_idle`].
    pub fn push(&mut self, next: SecondAggregate) {
        if let Some(last) = self.last_emitted {
            if next.timestamp <= last {
                warn!(
                    second = next.timestamp,
                    last_emitted = last,
                    "dropping second that does not advance the stream"
                );
                return;
            }
            if last + 1 < next.timestamp {
                debug!(from = last + 1, to = next.timestamp - 1, "adding zero seconds");
            }
        }

        if let Some(dropped) = self.held.replace(next) {
            warn!(second = dropped.timestamp, "replaced a held second");
        }
    }

    /// Returns the next zero second of a gap, or the held real second once the gap is closed.
    pub fn next_second(&mut self) -> Option<SecondAggregate> {
        let target = self.held.as_ref()?.timestamp;

        match self.last_emitted {
            // `last < target`, so `last + 1` cannot overflow.
            Some(last) if last + 1 < target => {
                self.last_emitted = Some(last + 1);
                Some(SecondAggregate::zero(last + 1))
            }
            _ => {
                self.last_emitted = Some(target);
                self.held.take()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(g: &mut GapFiller, next: SecondAggregate) -> Vec<(i64, bool)> {
        g.push(next);
        std::iter::from_fn(|| g.next_second())
            .map(|s| (s.timestamp, s.synthetic))
            .collect()
    }

    #[test]
    fn fills_two_missing_seconds() {
        let mut g = GapFiller::new();
        assert_eq!(
            fill(&mut g, SecondAggregate::from_records(100, &[], 0)),
            vec![(100, false)]
        );
        assert_eq!(
            fill(&mut g, SecondAggregate::from_records(103, &[], 0)),
            vec![(101, true), (102, true), (103, false)]
        );
        assert_eq!(g.last_emitted(), Some(103));
        assert!(g.is_idle());
    }

    #[test]
    fn adjacent_seconds_pass_through() {
        let mut g = GapFiller::new();
        fill(&mut g, SecondAggregate::from_records(1, &[], 0));
        assert_eq!(
            fill(&mut g, SecondAggregate::from_records(2, &[], 0)),
            vec![(2, false)]
        );
    }

    #[test]
    fn non_advancing_second_is_dropped() {
        let mut g = GapFiller::new();
        fill(&mut g, SecondAggregate::from_records(5, &[], 0));
        assert!(fill(&mut g, SecondAggregate::from_records(5, &[], 0)).is_empty());
        assert_eq!(g.last_emitted(), Some(5));
    }

    #[test]
    fn huge_gap_is_filled_one_second_at_a_time() {
        let mut g = GapFiller::new();
        fill(&mut g, SecondAggregate::from_records(i64::MIN, &[], 0));
        g.push(SecondAggregate::from_records(i64::MAX, &[], 0));

        for expected in [i64::MIN + 1, i64::MIN + 2, i64::MIN + 3] {
            let s = g.next_second().unwrap_or_else(|| panic!("expected a zero second"));
            assert_eq!((s.timestamp, s.synthetic), (expected, true));
        }
        assert!(!g.is_idle());
        assert_eq!(g.last_emitted(), Some(i64::MIN + 3));
    }
}
