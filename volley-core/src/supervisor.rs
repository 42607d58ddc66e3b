use std::io::{BufRead as _, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System};
use tracing::{debug, info, warn};

use crate::config::Mode;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorStatus {
    Running,
    /// Absolute exit code of the generator.
    Finished(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputSource {
    Stdout,
    Stderr,
}

impl OutputSource {
    fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Owns the generator process, or infers completion of an import from the
/// amount of data consumed.
///
/// Import mode has no exit status to observe: two consecutive polls that see
/// the same non-zero consumed count are taken as "finished". A source that
/// stalls for a whole poll interval is therefore declared done early, and an
/// import cannot be interrupted mid-run.
#[derive(Debug)]
pub struct ProcessSupervisor {
    mode: Mode,
    phout_file: PathBuf,
    child: Option<Child>,
    output: Option<Receiver<(OutputSource, String)>>,
    last_consumed: u64,
}

impl ProcessSupervisor {
    pub fn new(mode: Mode, phout_file: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            phout_file: phout_file.into(),
            child: None,
            output: None,
            last_consumed: 0,
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Validates the generator config out-of-process (`<generator> check <config>`).
    pub fn check(&self) -> Result<()> {
        let Mode::Generate { program, config } = &self.mode else {
            return Ok(());
        };

        debug!(program = %program.display(), config = %config.display(), "checking generator config");
        let out = Command::new(program)
            .arg("check")
            .arg(config)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| Error::Spawn {
                program: program.clone(),
                source,
            })?;

        if !out.status.success() {
            return Err(Error::ConfigCheckFailed(exit_code(out.status)));
        }

        let stderr = String::from_utf8_lossy(&out.stderr);
        if !stderr.trim().is_empty() {
            return Err(Error::ConfigCheckDiagnostics(stderr.trim().to_string()));
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        match &self.mode {
            Mode::Generate { program, config } => {
                info!(program = %program.display(), config = %config.display(), "starting generator");
                let mut child = Command::new(program)
                    .arg("run")
                    .arg(config)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(|source| Error::Spawn {
                        program: program.clone(),
                        source,
                    })?;

                let (tx, rx) = mpsc::channel();
                if let Some(stdout) = child.stdout.take() {
                    forward_lines(stdout, OutputSource::Stdout, tx.clone());
                }
                if let Some(stderr) = child.stderr.take() {
                    forward_lines(stderr, OutputSource::Stderr, tx);
                }

                self.output = Some(rx);
                self.child = Some(child);
                Ok(())
            }
            Mode::Import => {
                if !self.phout_file.exists() {
                    return Err(Error::ImportSourceMissing(self.phout_file.clone()));
                }
                warn!(
                    phout = %self.phout_file.display(),
                    "importing result file instead of running the generator"
                );
                Ok(())
            }
        }
    }

    /// Never blocks. `consumed` is the amount of data processed so far; it only
    /// matters in import mode.
    pub fn poll(&mut self, consumed: u64) -> Result<GeneratorStatus> {
        match self.mode {
            Mode::Generate { ref program, .. } => {
                self.log_output();
                let Some(child) = self.child.as_mut() else {
                    return Ok(GeneratorStatus::Running);
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        let code = exit_code(status);
                        info!(code, "generator finished");
                        Ok(GeneratorStatus::Finished(code))
                    }
                    Ok(None) => Ok(GeneratorStatus::Running),
                    Err(e) => Err(Error::io(program, e)),
                }
            }
            Mode::Import => {
                if consumed == 0 || consumed != self.last_consumed {
                    self.last_consumed = consumed;
                    return Ok(GeneratorStatus::Running);
                }
                Ok(GeneratorStatus::Finished(0))
            }
        }
    }

    /// Sends a termination signal if the generator is still alive. Does not wait for it.
    pub fn terminate(&mut self) {
        self.log_output();
        let Some(child) = self.child.as_mut() else {
            return;
        };

        match child.try_wait() {
            Ok(None) => {
                let pid = child.id();
                warn!(pid, "terminating generator process");
                if !send_term(pid)
                    && let Err(e) = child.kill()
                {
                    warn!(pid, error = %e, "failed to kill generator process");
                }
            }
            Ok(Some(_)) => debug!("generator already finished"),
            Err(e) => warn!(error = %e, "failed to query generator status"),
        }
    }

    fn log_output(&self) {
        let Some(rx) = self.output.as_ref() else {
            return;
        };
        for (source, line) in rx.try_iter() {
            match source {
                OutputSource::Stdout => info!(source = source.as_str(), "{line}"),
                OutputSource::Stderr => warn!(source = source.as_str(), "{line}"),
            }
        }
    }
}

fn forward_lines<R>(stream: R, source: OutputSource, tx: Sender<(OutputSource, String)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send((source, line)).is_err() {
                break;
            }
        }
    });
}

fn send_term(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    sys.process(pid)
        .and_then(|p| p.kill_with(Signal::Term))
        .unwrap_or(false)
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code.saturating_abs();
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt as _;
        if let Some(signal) = status.signal() {
            return signal;
        }
    }

    1
}
