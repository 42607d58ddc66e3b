/// How strongly a console value should stand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Highlight {
    Plain,
    Warn,
    Alert,
}

/// Wraps `text` in ANSI colour when `enabled`: yellow for warnings, red for alerts.
pub(crate) fn paint(text: &str, highlight: Highlight, enabled: bool) -> String {
    if !enabled {
        return text.to_string();
    }
    match highlight {
        Highlight::Plain => text.to_string(),
        Highlight::Warn => format!("\x1b[33m{text}\x1b[0m"),
        Highlight::Alert => format!("\x1b[31m{text}\x1b[0m"),
    }
}

/// `H:MM:SS`.
pub(crate) fn format_clock(secs: u64) -> String {
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

pub(crate) fn format_percent(ratio: f64) -> String {
    if ratio.is_finite() {
        format!("{:.0}%", ratio * 100.0)
    } else {
        "0%".to_string()
    }
}
