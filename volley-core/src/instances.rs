use std::collections::HashMap;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone as _};
use tracing::debug;

use crate::error::{Error, Result};

const TIME_PREFIX: &str = "time\t";
const TASKS_PREFIX: &str = "tasks\t";

/// Active worker counts keyed by epoch second, decoded from the generator's stat log.
///
/// Each `time` line opens a second (resetting it to zero); every following `tasks`
/// line adds its count to that second, since each worker reports separately.
#[derive(Debug, Default)]
pub struct InstanceCounts {
    by_second: HashMap<i64, u64>,
    current: Option<i64>,
}

impl InstanceCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_line(&mut self, line: &str) -> Result<()> {
        if let Some(raw) = line.strip_prefix(TIME_PREFIX) {
            let second = parse_stat_timestamp(raw)
                .ok_or_else(|| Error::InvalidStatTimestamp(raw.trim().to_string()))?;
            self.current = Some(second);
            self.by_second.insert(second, 0);
        } else if let Some(raw) = line.strip_prefix(TASKS_PREFIX) {
            let second = self.current.ok_or(Error::TasksBeforeTime)?;
            let count: u64 = raw
                .trim()
                .parse()
                .map_err(|_| Error::InvalidStatCount(raw.trim().to_string()))?;
            let total = self.by_second.entry(second).or_insert(0);
            *total = total.saturating_add(count);
            debug!(second, active = *total, "active instances");
        }
        Ok(())
    }

    pub fn get(&self, second: i64) -> Option<u64> {
        self.by_second.get(&second).copied()
    }

    /// Drops seconds older than `second`; they can no longer be emitted.
    pub fn forget_before(&mut self, second: i64) {
        self.by_second.retain(|s, _| *s >= second);
    }

    pub fn len(&self) -> usize {
        self.by_second.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_second.is_empty()
    }
}

/// Accepts epoch seconds, `%Y-%m-%d %H:%M:%S %z`, or a local `%Y-%m-%d %H:%M:%S`.
fn parse_stat_timestamp(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(epoch) = s.parse::<f64>() {
        return epoch.is_finite().then(|| epoch.floor() as i64);
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt.timestamp());
    }
    let head = s.get(..19)?;
    let naive = NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}
