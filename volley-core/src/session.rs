use std::sync::Arc;

use tracing::{debug, warn};

use crate::aggregate::SecondAggregate;
use crate::autostop::{Autostop, StopDecision};
use crate::config::{GeneratorInfo, Mode, SessionConfig};
use crate::error::Result;
use crate::publisher::{AggregateListener, AggregatePublisher};
use crate::reader::ResultReader;
use crate::supervisor::{GeneratorStatus, ProcessSupervisor};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Running,
    /// The generator exited (or the import went quiet) with this code.
    Finished(i32),
    Autostopped(StopDecision),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
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
    pub autostop: Option<StopDecision>,
}

/// One test run: check, start, poll until done, end, post-process.
///
/// The caller owns the poll loop and invokes [`Session::tick`] repeatedly.
#[derive(Debug)]
pub struct Session {
    info: Arc<GeneratorInfo>,
    reader: ResultReader,
    supervisor: ProcessSupervisor,
    publisher: AggregatePublisher,
    autostop: Autostop,
    summary: RunSummary,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let info = Arc::new(config.info);
        let autostop = Autostop::from_exprs(&config.autostop, &info)?;

        Ok(Self {
            reader: ResultReader::new(&info, config.buffered_seconds),
            supervisor: ProcessSupervisor::new(config.mode, &info.phout_file),
            publisher: AggregatePublisher::new(),
            autostop,
            summary: RunSummary {
                planned_ammo: info.ammo_count,
                ..RunSummary::default()
            },
            info,
        })
    }

    pub fn info(&self) -> &Arc<GeneratorInfo> {
        &self.info
    }

    pub fn mode(&self) -> &Mode {
        self.supervisor.mode()
    }

    pub fn buffered_seconds(&self) -> usize {
        self.reader.buffered_seconds()
    }

    pub fn subscribe(&mut self, listener: Box<dyn AggregateListener>) {
        self.publisher.subscribe(listener);
    }

    pub fn autostop(&self) -> &Autostop {
        &self.autostop
    }

    pub fn processed_ammo(&self) -> u64 {
        self.summary.processed_ammo
    }

    /// Runs the generator's config check. Must precede [`Session::start`].
    pub fn prepare(&self) -> Result<()> {
        self.supervisor.check()
    }

    pub fn start(&mut self) -> Result<()> {
        self.supervisor.start()
    }

    pub fn tick(&mut self) -> Result<SessionStatus> {
        for second in self.reader.poll(false)? {
            self.emit(second);
        }

        if let Some(d) = self.autostop.decision() {
            return Ok(SessionStatus::Autostopped(d.clone()));
        }

        // Lines, not emitted requests: seconds inside the window are not emitted yet.
        match self.supervisor.poll(self.reader.lines_read())? {
            GeneratorStatus::Running => Ok(SessionStatus::Running),
            GeneratorStatus::Finished(code) => Ok(SessionStatus::Finished(code)),
        }
    }

    /// Stops a still-running generator and flushes every pending second.
    pub fn end(&mut self) -> Result<()> {
        self.supervisor.terminate();
        self.reader.read_to_end()?;
        while let Some(second) = self.reader.next_second(true) {
            self.emit(second);
        }
        Ok(())
    }

    /// Final bookkeeping; a planned/processed ammo mismatch is only a warning.
    pub fn post_process(&mut self, code: i32) -> &RunSummary {
        if code == 0
            && self.info.ammo_count > 0
            && self.info.ammo_count != self.summary.processed_ammo
        {
            warn!(
                planned = self.info.ammo_count,
                processed = self.summary.processed_ammo,
                "planned ammo count differs from processed"
            );
        }

        self.summary.lines_read = self.reader.lines_read();
        self.summary.malformed_lines = self.reader.malformed_lines();
        self.summary.late_records = self.reader.late_records();
        self.summary.first_request_time = self.reader.first_request_time();
        self.summary.autostop = self.autostop.decision().cloned();
        &self.summary
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    fn emit(&mut self, second: SecondAggregate) {
        let s = &mut self.summary;
        s.seconds_emitted += 1;
        if second.synthetic {
            s.synthetic_seconds += 1;
        }
        s.processed_ammo += second.overall.rps;
        s.max_rps = s.max_rps.max(second.overall.rps);
        s.first_second.get_or_insert(second.timestamp);
        s.last_second = Some(second.timestamp);
        debug!(
            second = second.timestamp,
            rps = second.overall.rps,
            processed = s.processed_ammo,
            "processed ammo count"
        );

        self.publisher.publish(&second);
        self.autostop.notify(&second);
    }
}
