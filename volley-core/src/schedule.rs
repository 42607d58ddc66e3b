use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleStep {
    /// Requests per second planned while this step lasts.
    pub rate: u64,
    pub remaining_seconds: u64,
}

impl ScheduleStep {
    pub fn new(rate: u64, remaining_seconds: u64) -> Self {
        Self {
            rate,
            remaining_seconds,
        }
    }

    /// Whole seconds of `duration`, rounding a fractional tail up.
    pub fn for_duration(rate: u64, duration: Duration) -> Self {
        let mut secs = duration.as_secs();
        if duration.subsec_nanos() > 0 {
            secs += 1;
        }
        Self::new(rate, secs)
    }
}

/// Tags each emitted second with the request count the schedule planned for it.
#[derive(Debug, Clone, Default)]
pub struct LoadSchedule {
    steps: VecDeque<ScheduleStep>,
}

impl LoadSchedule {
    pub fn new(steps: impl IntoIterator<Item = ScheduleStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Consumes one second of the schedule and returns its planned rate (0 once exhausted).
    pub fn next_planned(&mut self) -> u64 {
        while self
            .steps
            .front()
            .is_some_and(|s| s.remaining_seconds == 0)
        {
            self.steps.pop_front();
        }

        match self.steps.front_mut() {
            Some(step) => {
                step.remaining_seconds -= 1;
                step.rate
            }
            None => 0,
        }
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.steps.iter().map(|s| s.remaining_seconds).sum()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_seconds() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planned_values_follow_steps() {
        let mut s = LoadSchedule::new([ScheduleStep::new(100, 2), ScheduleStep::new(50, 1)]);
        assert_eq!(s.remaining_seconds(), 3);
        assert_eq!(s.next_planned(), 100);
        assert_eq!(s.next_planned(), 100);
        assert_eq!(s.next_planned(), 50);
        assert!(s.is_exhausted());
        assert_eq!(s.next_planned(), 0);
    }

    #[test]
    fn skips_empty_steps() {
        let mut s = LoadSchedule::new([
            ScheduleStep::new(10, 0),
            ScheduleStep::new(20, 1),
            ScheduleStep::new(30, 0),
            ScheduleStep::new(40, 1),
        ]);
        assert_eq!(s.next_planned(), 20);
        assert_eq!(s.next_planned(), 40);
        assert_eq!(s.next_planned(), 0);
    }

    #[test]
    fn empty_schedule_plans_nothing() {
        let mut s = LoadSchedule::default();
        assert_eq!(s.next_planned(), 0);
    }

    #[test]
    fn for_duration_rounds_up() {
        assert_eq!(
            ScheduleStep::for_duration(5, Duration::from_millis(2500)),
            ScheduleStep::new(5, 3)
        );
        assert_eq!(
            ScheduleStep::for_duration(5, Duration::from_secs(2)),
            ScheduleStep::new(5, 2)
        );
    }
}
