use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;

use volley_core::{AggregateListener, GeneratorInfo, Mode, RunSummary, SecondAggregate, listener_fn};

use super::{Frame, OutputFormatter};
use crate::exit_codes::ExitCode;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _info: &GeneratorInfo, _mode: &Mode) {}

    fn listener(&self) -> Option<Box<dyn AggregateListener>> {
        Some(Box::new(listener_fn(|second: &SecondAggregate| {
            emit_json_line(&build_second_line(second));
        })))
    }

    fn render(&self, _frame: &Frame<'_>) {}

    fn print_summary(&self, summary: &RunSummary, exit: ExitCode) -> anyhow::Result<()> {
        emit_json_line(&build_summary_line(summary, exit));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSecondLine<'a> {
    pub kind: &'static str,
    pub timestamp: i64,
    pub synthetic: bool,

    pub rps: u64,
    pub planned_requests: u64,
    pub active_instances: u64,
    pub selfload: f64,

    pub avg_response_ms: f64,
    pub avg_connect_ms: f64,
    pub avg_send_ms: f64,
    pub avg_latency_ms: f64,
    pub avg_receive_ms: f64,
    pub max_response_ms: u64,

    pub bytes_sent: u64,
    pub bytes_received: u64,

    pub http_codes: &'a BTreeMap<i32, u64>,
    pub net_codes: &'a BTreeMap<i32, u64>,
    pub tags: &'a BTreeMap<String, u64>,
}

fn build_second_line(s: &SecondAggregate) -> JsonSecondLine<'_> {
    let o = &s.overall;
    JsonSecondLine {
        kind: "second",
        timestamp: s.timestamp,
        synthetic: s.synthetic,

        rps: o.rps,
        planned_requests: o.planned_requests,
        active_instances: o.active_instances,
        selfload: o.selfload,

        avg_response_ms: o.avg_response_ms,
        avg_connect_ms: o.avg_connect_ms,
        avg_send_ms: o.avg_send_ms,
        avg_latency_ms: o.avg_latency_ms,
        avg_receive_ms: o.avg_receive_ms,
        max_response_ms: o.max_response_ms,

        bytes_sent: o.bytes_sent,
        bytes_received: o.bytes_received,

        http_codes: &o.http_codes,
        net_codes: &o.net_codes,
        tags: &s.tags,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub exit_code: i32,

    pub seconds_emitted: u64,
    pub synthetic_seconds: u64,
    pub processed_ammo: u64,
    pub planned_ammo: u64,
    pub max_rps: u64,

    pub lines_read: u64,
    pub malformed_lines: u64,
    pub late_records: u64,

    pub first_request_time: Option<f64>,
    pub first_second: Option<i64>,
    pub last_second: Option<i64>,

    pub autostop: Option<JsonAutostop>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonAutostop {
    pub rc: i32,
    pub reason: String,
    pub timestamp: i64,
}

fn build_summary_line(summary: &RunSummary, exit: ExitCode) -> JsonSummaryLine {
    JsonSummaryLine {
        kind: "summary",
        exit_code: exit.as_i32(),

        seconds_emitted: summary.seconds_emitted,
        synthetic_seconds: summary.synthetic_seconds,
        processed_ammo: summary.processed_ammo,
        planned_ammo: summary.planned_ammo,
        max_rps: summary.max_rps,

        lines_read: summary.lines_read,
        malformed_lines: summary.malformed_lines,
        late_records: summary.late_records,

        first_request_time: summary.first_request_time,
        first_second: summary.first_second,
        last_second: summary.last_second,

        autostop: summary.autostop.as_ref().map(|d| JsonAutostop {
            rc: d.rc,
            reason: d.reason.clone(),
            timestamp: d.timestamp,
        }),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
