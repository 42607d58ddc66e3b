use anyhow::Context as _;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use volley_core::{GeneratorInfo, Mode, ScheduleStep, SessionConfig};

/// On-disk run description consumed by `volley run`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RunFile {
    /// Generator executable, invoked as `<generator> check|run <generator_config>`.
    #[serde(default = "default_generator")]
    pub generator: PathBuf,

    /// Without a generator config the phout file is imported instead.
    #[serde(default)]
    pub generator_config: Option<PathBuf>,

    pub phout: PathBuf,

    #[serde(default)]
    pub stat_log: Option<PathBuf>,

    #[serde(default)]
    pub instances: u64,

    #[serde(default)]
    pub ammo_count: u64,

    #[serde(default)]
    pub duration: Option<YamlDuration>,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub ammo_file: Option<PathBuf>,

    #[serde(default)]
    pub schedule: Vec<StepYaml>,

    #[serde(default)]
    pub buffered_seconds: Option<usize>,

    #[serde(default)]
    pub eta_file: Option<PathBuf>,

    #[serde(default)]
    pub autostop: Vec<String>,
}

fn default_generator() -> PathBuf {
    PathBuf::from("phantom")
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StepYaml {
    pub rate: u64,
    pub duration: YamlDuration,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v <= 0 {
                    return Err(E::custom("duration must be positive"));
                }
                Ok(YamlDuration(Duration::from_secs(v as u64)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v <= 0.0 {
                    return Err(E::custom("duration must be a positive, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// A loaded run file, with paths resolved against the file's directory.
#[derive(Debug, Clone)]
pub(crate) struct LoadedRun {
    pub session: SessionConfig,
    pub eta_file: Option<PathBuf>,
}

pub(crate) async fn load(path: &Path) -> anyhow::Result<LoadedRun> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read run config: {}", path.display()))?;
    let file: RunFile = serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse run config: {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(file.into_run(base))
}

impl RunFile {
    pub(crate) fn into_run(self, base: &Path) -> LoadedRun {
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };

        let steps: Vec<ScheduleStep> = self
            .schedule
            .iter()
            .map(|s| ScheduleStep::for_duration(s.rate, s.duration.into_inner()))
            .collect();

        // Without an explicit duration the schedule's length is the best estimate.
        let duration = self.duration.map(YamlDuration::into_inner).or_else(|| {
            let secs: u64 = steps.iter().map(|s| s.remaining_seconds).sum();
            (secs > 0).then(|| Duration::from_secs(secs))
        });

        let info = GeneratorInfo {
            instances: self.instances,
            ammo_count: self.ammo_count,
            duration,
            address: self.address,
            port: self.port,
            ammo_file: self.ammo_file.map(resolve),
            steps,
            phout_file: resolve(self.phout),
            stat_log: self.stat_log.map(resolve),
        };

        // Bare names are looked up on PATH.
        let program = if self.generator.components().count() > 1 {
            resolve(self.generator)
        } else {
            self.generator
        };

        let mode = match self.generator_config {
            Some(config) => Mode::Generate {
                program,
                config: resolve(config),
            },
            None => Mode::Import,
        };

        let mut session = SessionConfig::new(info, mode);
        if let Some(b) = self.buffered_seconds {
            session.buffered_seconds = b;
        }
        session.autostop = self.autostop;

        LoadedRun {
            session,
            eta_file: self.eta_file.map(resolve),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> RunFile {
        match serde_yaml::from_str(yaml) {
            Ok(v) => v,
            Err(err) => panic!("failed to parse yaml: {err}"),
        }
    }

    #[test]
    fn resolves_paths_and_schedule() {
        let file = parse(
            r#"
generator: ./bin/gen
generator_config: load.ini
phout: out/phout.txt
stat_log: /var/log/stat.log
instances: 100
ammo_count: 250
schedule:
  - rate: 100
    duration: 2s
  - rate: 50
    duration: 1
buffered_seconds: 3
eta_file: eta.txt
autostop:
  - instances(80%,10s)
"#,
        );

        let run = file.into_run(Path::new("/work"));
        let info = &run.session.info;
        assert_eq!(info.phout_file, PathBuf::from("/work/out/phout.txt"));
        assert_eq!(info.stat_log, Some(PathBuf::from("/var/log/stat.log")));
        assert_eq!(info.instances, 100);
        assert_eq!(info.ammo_count, 250);
        assert_eq!(
            info.steps,
            vec![ScheduleStep::new(100, 2), ScheduleStep::new(50, 1)]
        );
        assert_eq!(info.duration, Some(Duration::from_secs(3)));
        assert_eq!(
            run.session.mode,
            Mode::Generate {
                program: PathBuf::from("/work/./bin/gen"),
                config: PathBuf::from("/work/load.ini"),
            }
        );
        assert_eq!(run.session.buffered_seconds, 3);
        assert_eq!(run.session.autostop, vec!["instances(80%,10s)".to_string()]);
        assert_eq!(run.eta_file, Some(PathBuf::from("/work/eta.txt")));
    }

    #[test]
    fn default_generator_stays_on_path() {
        let file = parse("generator_config: a.ini\nphout: p.txt\nduration: 1m\n");
        let run = file.into_run(Path::new("/work"));
        match run.session.mode {
            Mode::Generate { program, .. } => assert_eq!(program, PathBuf::from("phantom")),
            Mode::Import => panic!("expected generate mode"),
        }
        assert_eq!(run.session.info.duration, Some(Duration::from_secs(60)));
        assert_eq!(
            run.session.buffered_seconds,
            volley_core::DEFAULT_BUFFERED_SECONDS
        );
    }

    #[test]
    fn missing_generator_config_selects_import() {
        let run = parse("phout: p.txt\n").into_run(Path::new("/work"));
        assert_eq!(run.session.mode, Mode::Import);
        assert_eq!(run.session.info.phout_file, PathBuf::from("/work/p.txt"));
        assert_eq!(run.session.info.duration, None);
    }

    #[test]
    fn rejects_unknown_fields_and_bad_durations() {
        assert!(serde_yaml::from_str::<RunFile>("phout: p\nrps: 5\n").is_err());
        assert!(serde_yaml::from_str::<RunFile>("phout: p\nduration: -5\n").is_err());
    }
}
