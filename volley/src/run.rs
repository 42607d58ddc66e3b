use anyhow::Context as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use volley_core::{GeneratorInfo, Mode, Session, SessionConfig, SessionStatus, StopDecision};

use crate::cli::{ImportArgs, RunArgs, SessionArgs};
use crate::config_yaml;
use crate::exit_codes::ExitCode;
use crate::output::{self, EtaTracker, Frame, OutputFormatter};
use crate::run_error::RunError;

#[derive(Debug)]
enum Outcome {
    Finished(i32),
    Autostopped(StopDecision),
    Interrupted,
}

impl Outcome {
    /// Code handed to post-processing; only a clean finish is zero.
    fn code(&self) -> i32 {
        match self {
            Self::Finished(c) => *c,
            Self::Autostopped(d) => d.rc,
            Self::Interrupted => ExitCode::Interrupted.as_i32(),
        }
    }
}

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let loaded = config_yaml::load(&args.config)
        .await
        .map_err(RunError::classify)?;
    let eta_file = args.eta_file.or(loaded.eta_file);

    drive(loaded.session, &args.session, eta_file)
        .await
        .map_err(RunError::classify)
}

pub async fn import(args: ImportArgs) -> Result<ExitCode, RunError> {
    let info = GeneratorInfo {
        instances: args.instances,
        ammo_count: args.ammo_count,
        steps: args.steps,
        phout_file: args.phout,
        stat_log: args.stat_log,
        ..GeneratorInfo::default()
    };

    drive(SessionConfig::new(info, Mode::Import), &args.session, None)
        .await
        .map_err(RunError::classify)
}

async fn drive(
    mut config: SessionConfig,
    args: &SessionArgs,
    eta_file: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    if let Some(b) = args.buffered_seconds {
        config.buffered_seconds = b;
    }
    config.autostop.extend(args.autostop.iter().cloned());

    let generate = !config.mode.is_import();
    let out = output::formatter(args.output, &config.info, config.buffered_seconds);
    let eta = Arc::new(Mutex::new(EtaTracker::new(&config.info)));

    let mut session = Session::new(config).context("invalid session configuration")?;
    out.print_header(session.info(), session.mode());
    if let Some(listener) = out.listener() {
        session.subscribe(listener);
    }
    session.subscribe(Box::new(eta.clone()));

    session
        .prepare()
        .context("generator config check failed")?;
    session.start().context("failed to start the test")?;
    let started = Instant::now();
    info!(
        buffered_seconds = session.buffered_seconds(),
        poll_interval = %humantime::format_duration(args.poll_interval),
        "test started"
    );

    let mut interval = tokio::time::interval(args.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    // Imports are not cancellable mid-run; SIGINT keeps its default action there.
    let mut ctrl_c_armed = generate;

    let outcome = loop {
        tokio::select! {
            _ = interval.tick() => {}
            res = &mut ctrl_c, if ctrl_c_armed => {
                match res {
                    Ok(()) => {
                        warn!("interrupted, ending the test");
                        break Outcome::Interrupted;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to listen for ctrl-c");
                        ctrl_c_armed = false;
                        continue;
                    }
                }
            }
        }

        let status = match session.tick() {
            Ok(s) => s,
            Err(e) => {
                if let Err(end_err) = session.end() {
                    warn!(error = %end_err, "failed to end the test after an error");
                }
                return Err(anyhow::Error::new(e).context("failed to process results"));
            }
        };

        render_frame(out.as_ref(), &session, &eta, started, generate, eta_file.as_ref()).await;

        match status {
            SessionStatus::Running => {}
            SessionStatus::Finished(code) => break Outcome::Finished(code),
            SessionStatus::Autostopped(d) => break Outcome::Autostopped(d),
        }
    };

    session.end().context("failed to flush results")?;

    let summary = session.post_process(outcome.code()).clone();
    render_frame(out.as_ref(), &session, &eta, started, generate, eta_file.as_ref()).await;

    let exit = match outcome {
        Outcome::Interrupted => ExitCode::Interrupted,
        _ if summary.autostop.is_some() => ExitCode::Autostopped,
        Outcome::Autostopped(_) => ExitCode::Autostopped,
        Outcome::Finished(code) => {
            if code != 0 {
                warn!(code, "generator exited with non-zero status");
            }
            ExitCode::from_generator(code)
        }
    };

    out.print_summary(&summary, exit)?;
    Ok(exit)
}

async fn render_frame(
    out: &dyn OutputFormatter,
    session: &Session,
    eta: &Mutex<EtaTracker>,
    started: Instant,
    generate: bool,
    eta_file: Option<&PathBuf>,
) {
    let elapsed = started.elapsed();
    let estimate = generate.then(|| {
        eta.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .estimate(elapsed)
    });

    out.render(&Frame {
        elapsed,
        estimate,
        counting: session.autostop().counting(),
    });

    if let (Some(path), Some(e)) = (eta_file, estimate)
        && let Err(err) = output::write_eta_file(path, e.eta_secs).await
    {
        warn!(error = %format!("{err:#}"), "failed to update eta file");
    }
}
