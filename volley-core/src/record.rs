//! Phout-style request records.
//!
//! A phout line is 12 tab-separated fields:
//!
//! ```text
//! epoch  tag  overall  connect  send  latency  receive  interval_event  sent  received  net_code  http_code
//! ```
//!
//! All timings are microseconds; `epoch` is the request start time in (fractional) seconds.

pub const PHOUT_FIELDS: usize = 12;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LineError {
    #[error("expected {PHOUT_FIELDS} fields, got {0}")]
    FieldCount(usize),

    #[error("field #{index} is not a number: `{value}`")]
    BadField { index: usize, value: String },

    #[error("empty line")]
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub start_epoch: f64,
    pub tag: String,
    pub overall_us: u64,
    pub connect_us: u64,
    pub send_us: u64,
    pub latency_us: u64,
    pub receive_us: u64,
    /// Numerator of the accuracy ratio.
    pub interval_event_us: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub net_code: i32,
    pub http_code: i32,
    /// Active instances sampled for the completion second when the record was ingested.
    pub active_instances: u64,
}

impl RequestRecord {
    /// Second the request completed in. Records are bucketed by completion, not start.
    #[must_use]
    pub fn completion_second(&self) -> i64 {
        (self.start_epoch + self.overall_us as f64 / 1_000_000.0).floor() as i64
    }

    #[must_use]
    pub fn accuracy(&self) -> f64 {
        (self.interval_event_us as f64 + 1.0) / (self.overall_us as f64 + 1.0)
    }

    #[must_use]
    pub fn overall_ms(&self) -> u64 {
        self.overall_us / 1000
    }
}

pub fn parse_phout_line(line: &str) -> Result<RequestRecord, LineError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(LineError::Empty);
    }

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != PHOUT_FIELDS {
        return Err(LineError::FieldCount(fields.len()));
    }

    let start_epoch: f64 = parse_field(&fields, 0)?;
    if !start_epoch.is_finite() {
        return Err(bad_field(&fields, 0));
    }

    Ok(RequestRecord {
        start_epoch,
        tag: fields[1].to_string(),
        overall_us: parse_field(&fields, 2)?,
        connect_us: parse_field(&fields, 3)?,
        send_us: parse_field(&fields, 4)?,
        latency_us: parse_field(&fields, 5)?,
        receive_us: parse_field(&fields, 6)?,
        interval_event_us: parse_field(&fields, 7)?,
        bytes_sent: parse_field(&fields, 8)?,
        bytes_received: parse_field(&fields, 9)?,
        net_code: parse_field(&fields, 10)?,
        http_code: parse_field(&fields, 11)?,
        active_instances: 0,
    })
}

fn parse_field<T: std::str::FromStr>(fields: &[&str], index: usize) -> Result<T, LineError> {
    fields[index]
        .trim()
        .parse()
        .map_err(|_| bad_field(fields, index))
}

fn bad_field(fields: &[&str], index: usize) -> LineError {
    LineError::BadField {
        index,
        value: fields[index].to_string(),
    }
}
