use std::fmt::Write as _;

use volley_core::RunSummary;

use super::format::format_clock;
use crate::exit_codes::ExitCode;

pub(crate) fn render(summary: &RunSummary, exit: ExitCode) -> String {
    let mut out = String::new();

    out.push_str("summary\n");

    match (summary.first_second, summary.last_second) {
        (Some(first), Some(last)) => {
            let span = u64::try_from(last - first + 1).unwrap_or(0);
            writeln!(
                &mut out,
                "  seconds: {} ({} synthetic) span {first}..{last} ({})",
                summary.seconds_emitted,
                summary.synthetic_seconds,
                format_clock(span)
            )
            .ok();
        }
        _ => {
            out.push_str("  seconds: none\n");
        }
    }

    if summary.planned_ammo > 0 {
        writeln!(
            &mut out,
            "  requests: {} (planned {})",
            summary.processed_ammo, summary.planned_ammo
        )
        .ok();
    } else {
        writeln!(&mut out, "  requests: {}", summary.processed_ammo).ok();
    }
    writeln!(&mut out, "  max rps: {}", summary.max_rps).ok();
    writeln!(
        &mut out,
        "  lines: {} (malformed {}, late {})",
        summary.lines_read, summary.malformed_lines, summary.late_records
    )
    .ok();

    if let Some(t) = summary.first_request_time {
        writeln!(&mut out, "  first request: {t:.3}").ok();
    }

    if let Some(d) = &summary.autostop {
        writeln!(
            &mut out,
            "  autostop: {} (rc {}, second {})",
            d.reason, d.rc, d.timestamp
        )
        .ok();
    }

    writeln!(&mut out, "  exit code: {}", exit.as_i32()).ok();
    out
}
