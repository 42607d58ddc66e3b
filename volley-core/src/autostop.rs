use std::time::Duration;

use tracing::{debug, info};

use crate::aggregate::SecondAggregate;
use crate::config::GeneratorInfo;
use crate::error::{Error, Result};

/// Stop reason code of the instances criterion.
pub const RC_INSTANCES: i32 = 24;

/// A condition over the aggregate stream that can end the test early.
pub trait Criterion: Send {
    fn type_name(&self) -> &'static str;

    /// Returns `true` when the test should stop.
    fn notify(&mut self, second: &SecondAggregate, counting: &mut Counting) -> bool;

    fn rc(&self) -> i32;

    fn explain(&self) -> String;

    /// Short label plus how close the criterion is to firing (`0.0..=1.0`).
    fn widget_explain(&self) -> (String, f64);
}

/// Criteria that are accumulating a streak in the current second.
#[derive(Debug, Default)]
pub struct Counting {
    entries: Vec<(String, f64)>,
}

impl Counting {
    pub fn add(&mut self, criterion: &dyn Criterion) {
        self.entries.push(criterion.widget_explain());
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopDecision {
    pub rc: i32,
    pub reason: String,
    /// Second that completed the breach.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InstancesLevel {
    Absolute(u64),
    /// Fraction of the instance limit, `0.8` for `80%`.
    Fraction(f64),
}

/// Fires when active instances stay above a level for a number of consecutive seconds.
#[derive(Debug)]
pub struct InstancesCriterion {
    level: InstancesLevel,
    seconds_limit: u64,
    instance_limit: u64,
    seconds_count: u64,
    cause_second: Option<i64>,
}

impl InstancesCriterion {
    pub fn new(level: InstancesLevel, seconds_limit: u64, instance_limit: u64) -> Result<Self> {
        if seconds_limit == 0 {
            return Err(Error::InvalidConfig(
                "instances criterion needs a positive duration".to_string(),
            ));
        }
        if matches!(level, InstancesLevel::Fraction(_)) && instance_limit == 0 {
            return Err(Error::InvalidConfig(
                "cannot create relative instances criterion with zero instances limit"
                    .to_string(),
            ));
        }
        Ok(Self {
            level,
            seconds_limit,
            instance_limit,
            seconds_count: 0,
            cause_second: None,
        })
    }

    /// Parses `<level>[%],<duration>`, e.g. `80%,10s` or `500,1m`.
    pub fn parse(params: &str, info: &GeneratorInfo) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidCriterion {
            expr: params.to_string(),
            reason: reason.to_string(),
        };

        let (level_raw, duration_raw) = params
            .split_once(',')
            .ok_or_else(|| invalid("expected `<level>,<duration>`"))?;
        let level_raw = level_raw.trim();

        let level = match level_raw.strip_suffix('%') {
            Some(pct) => {
                let pct: f64 = pct
                    .trim()
                    .parse()
                    .map_err(|_| invalid("level percent is not a number"))?;
                InstancesLevel::Fraction(pct / 100.0)
            }
            None => InstancesLevel::Absolute(
                level_raw
                    .parse()
                    .map_err(|_| invalid("level is not a non-negative integer"))?,
            ),
        };

        let seconds = parse_seconds(duration_raw).ok_or_else(|| invalid("invalid duration"))?;
        Self::new(level, seconds, info.instances)
    }

    pub fn seconds_count(&self) -> u64 {
        self.seconds_count
    }

    pub fn cause_second(&self) -> Option<i64> {
        self.cause_second
    }

    fn breaches(&self, active: u64) -> bool {
        match self.level {
            InstancesLevel::Absolute(level) => active > level,
            InstancesLevel::Fraction(level) => {
                active as f64 / self.instance_limit as f64 > level
            }
        }
    }

    fn level_label(&self) -> String {
        match self.level {
            InstancesLevel::Absolute(level) => level.to_string(),
            InstancesLevel::Fraction(level) => format!("{}%", level * 100.0),
        }
    }
}

impl Criterion for InstancesCriterion {
    fn type_name(&self) -> &'static str {
        "instances"
    }

    fn notify(&mut self, second: &SecondAggregate, counting: &mut Counting) -> bool {
        if !self.breaches(second.overall.active_instances) {
            self.seconds_count = 0;
            return false;
        }

        if self.seconds_count == 0 {
            self.cause_second = Some(second.timestamp);
        }
        self.seconds_count += 1;
        debug!("{}", self.explain());
        counting.add(&*self);

        self.seconds_count >= self.seconds_limit
    }

    fn rc(&self) -> i32 {
        RC_INSTANCES
    }

    fn explain(&self) -> String {
        let since = self
            .cause_second
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        format!(
            "Testing threads (instances) utilization higher than {} for {}s, since {since}",
            self.level_label(),
            self.seconds_count
        )
    }

    fn widget_explain(&self) -> (String, f64) {
        (
            format!(
                "Instances >{} for {}/{}s",
                self.level_label(),
                self.seconds_count,
                self.seconds_limit
            ),
            self.seconds_count as f64 / self.seconds_limit as f64,
        )
    }
}

/// Evaluates every criterion on each second and keeps the first stop decision.
#[derive(Default)]
pub struct Autostop {
    criteria: Vec<Box<dyn Criterion>>,
    counting: Counting,
    decision: Option<StopDecision>,
}

impl Autostop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds criteria from expressions such as `instances(80%,10s)`.
    pub fn from_exprs(exprs: &[String], info: &GeneratorInfo) -> Result<Self> {
        let mut autostop = Self::new();
        for expr in exprs {
            autostop.add_criterion(parse_criterion(expr, info)?);
        }
        Ok(autostop)
    }

    pub fn add_criterion(&mut self, criterion: Box<dyn Criterion>) {
        self.criteria.push(criterion);
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn decision(&self) -> Option<&StopDecision> {
        self.decision.as_ref()
    }

    /// Criteria counting toward a stop as of the last second.
    pub fn counting(&self) -> &[(String, f64)] {
        self.counting.entries()
    }

    pub fn notify(&mut self, second: &SecondAggregate) -> Option<&StopDecision> {
        self.counting.clear();
        for c in &mut self.criteria {
            if c.notify(second, &mut self.counting) && self.decision.is_none() {
                let reason = c.explain();
                info!(rc = c.rc(), %reason, "autostop triggered");
                self.decision = Some(StopDecision {
                    rc: c.rc(),
                    reason,
                    timestamp: second.timestamp,
                });
            }
        }
        self.decision.as_ref()
    }
}

impl std::fmt::Debug for Autostop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autostop")
            .field(
                "criteria",
                &self.criteria.iter().map(|c| c.type_name()).collect::<Vec<_>>(),
            )
            .field("decision", &self.decision)
            .finish()
    }
}

pub fn parse_criterion(expr: &str, info: &GeneratorInfo) -> Result<Box<dyn Criterion>> {
    let s = expr.trim();
    let invalid = |reason: String| Error::InvalidCriterion {
        expr: expr.to_string(),
        reason,
    };

    let (kind, params) = s
        .split_once('(')
        .and_then(|(kind, rest)| rest.strip_suffix(')').map(|p| (kind.trim(), p)))
        .ok_or_else(|| invalid("expected `<type>(<params>)`".to_string()))?;

    match kind {
        "instances" => Ok(Box::new(InstancesCriterion::parse(params, info)?)),
        other => Err(invalid(format!("unknown criterion type `{other}`"))),
    }
}

/// Bare integers are seconds; anything else is a humantime duration (`10s`, `1m`).
fn parse_seconds(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(secs);
    }
    humantime::parse_duration(raw)
        .ok()
        .map(|d: Duration| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn second(ts: i64, active: u64) -> SecondAggregate {
        SecondAggregate::from_records(ts, &[], active)
    }

    fn info(instances: u64) -> GeneratorInfo {
        GeneratorInfo {
            instances,
            ..GeneratorInfo::default()
        }
    }

    #[test]
    fn absolute_level_fires_once_after_sustained_breach() {
        let mut c = InstancesCriterion::new(InstancesLevel::Absolute(10), 3, 100)
            .unwrap_or_else(|e| panic!("{e}"));
        let mut counting = Counting::default();

        let fired: Vec<bool> = [11, 12, 9, 11, 11, 11]
            .iter()
            .enumerate()
            .map(|(i, a)| c.notify(&second(i as i64, *a), &mut counting))
            .collect();

        assert_eq!(fired, vec![false, false, false, false, false, true]);
        assert_eq!(c.seconds_count(), 3);
        assert_eq!(c.cause_second(), Some(3));
    }

    #[test]
    fn value_at_level_resets_streak() {
        let mut c = InstancesCriterion::new(InstancesLevel::Absolute(10), 2, 100)
            .unwrap_or_else(|e| panic!("{e}"));
        let mut counting = Counting::default();
        assert!(!c.notify(&second(0, 11), &mut counting));
        assert!(!c.notify(&second(1, 10), &mut counting));
        assert_eq!(c.seconds_count(), 0);
        assert!(!c.notify(&second(2, 11), &mut counting));
        assert!(c.notify(&second(3, 11), &mut counting));
    }

    #[test]
    fn fraction_level_uses_instance_limit() {
        let mut c =
            InstancesCriterion::parse("50%,2", &info(20)).unwrap_or_else(|e| panic!("{e}"));
        let mut counting = Counting::default();
        assert!(!c.notify(&second(0, 10), &mut counting));
        assert!(counting.entries().is_empty());
        assert!(!c.notify(&second(1, 11), &mut counting));
        assert_eq!(counting.entries().len(), 1);
        assert!(c.notify(&second(2, 15), &mut counting));

        let (label, progress) = c.widget_explain();
        assert_eq!(label, "Instances >50% for 2/2s");
        assert!((progress - 1.0).abs() < 1e-9);
    }

    #[test]
    fn relative_level_needs_instance_limit() {
        assert!(InstancesCriterion::parse("80%,10s", &info(0)).is_err());
        assert!(InstancesCriterion::parse("80,10s", &info(0)).is_ok());
    }

    #[test]
    fn parses_expressions() {
        let c = parse_criterion("instances(80%, 1m)", &info(10)).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(c.type_name(), "instances");
        assert_eq!(c.rc(), RC_INSTANCES);

        assert!(parse_criterion("time(1s,10s)", &info(10)).is_err());
        assert!(parse_criterion("instances", &info(10)).is_err());
        assert!(parse_criterion("instances(10)", &info(10)).is_err());
        assert!(parse_criterion("instances(x,1s)", &info(10)).is_err());
        assert!(parse_criterion("instances(10,0s)", &info(10)).is_err());
    }

    #[test]
    fn autostop_keeps_first_decision() {
        let mut a = Autostop::from_exprs(&["instances(5,1)".to_string()], &info(10))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(a.len(), 1);
        assert!(a.notify(&second(100, 1)).is_none());
        assert!(a.counting().is_empty());

        let d = a
            .notify(&second(101, 6))
            .cloned()
            .unwrap_or_else(|| panic!("expected a stop decision"));
        assert_eq!(d.rc, RC_INSTANCES);
        assert_eq!(d.timestamp, 101);
        assert_eq!(a.counting().len(), 1);

        a.notify(&second(102, 7));
        assert_eq!(a.decision().map(|d| d.timestamp), Some(101));
    }
}
