use std::path::PathBuf;
use std::time::Duration;

use crate::schedule::ScheduleStep;

/// Default stabilization window, in seconds.
pub const DEFAULT_BUFFERED_SECONDS: usize = 2;

/// Read-only facts about the generator and the planned test.
///
/// Built once at setup and handed to every component that needs it.
#[derive(Debug, Clone, Default)]
pub struct GeneratorInfo {
    /// Maximum number of concurrent generator instances.
    pub instances: u64,
    /// Planned number of requests.
    pub ammo_count: u64,
    pub duration: Option<Duration>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub ammo_file: Option<PathBuf>,
    pub steps: Vec<ScheduleStep>,
    /// Phout-style result stream.
    pub phout_file: PathBuf,
    /// Active instance count stream.
    pub stat_log: Option<PathBuf>,
}

impl GeneratorInfo {
    /// Human-readable rendering of the schedule, e.g. `100x2s 50x1s`.
    pub fn schedule_label(&self) -> String {
        self.steps
            .iter()
            .map(|s| format!("{}x{}s", s.rate, s.remaining_seconds))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How the result stream is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Spawn the generator with a prepared config.
    Generate { program: PathBuf, config: PathBuf },
    /// Consume a previously produced result file.
    Import,
}

impl Mode {
    pub fn is_import(&self) -> bool {
        matches!(self, Self::Import)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub info: GeneratorInfo,
    pub mode: Mode,
    pub buffered_seconds: usize,
    /// Autostop criteria, e.g. `instances(80%,10s)`.
    pub autostop: Vec<String>,
}

impl SessionConfig {
    pub fn new(info: GeneratorInfo, mode: Mode) -> Self {
        Self {
            info,
            mode,
            buffered_seconds: DEFAULT_BUFFERED_SECONDS,
            autostop: Vec::new(),
        }
    }
}
