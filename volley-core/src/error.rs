use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("instance count stream has a `tasks` line before any `time` line")]
    TasksBeforeTime,

    #[error("instance count stream has an invalid timestamp: `{0}`")]
    InvalidStatTimestamp(String),

    #[error("instance count stream has an invalid task count: `{0}`")]
    InvalidStatCount(String),

    #[error("generator config check failed with exit code {0}")]
    ConfigCheckFailed(i32),

    #[error("generator config check reported: {0}")]
    ConfigCheckDiagnostics(String),

    #[error("result file for import does not exist: `{}`", .0.display())]
    ImportSourceMissing(PathBuf),

    #[error("failed to spawn generator `{}`: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid autostop criterion `{expr}`: {reason}")]
    InvalidCriterion { expr: String, reason: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure stems from user-provided configuration rather than the runtime.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::ConfigCheckFailed(_)
                | Self::ConfigCheckDiagnostics(_)
                | Self::ImportSourceMissing(_)
                | Self::InvalidCriterion { .. }
                | Self::InvalidConfig(_)
        )
    }
}
