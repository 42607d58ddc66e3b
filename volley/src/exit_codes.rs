#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// The generator exited with a non-zero status.
    GeneratorFailed = 21,

    /// An autostop criterion ended the test.
    Autostopped = 24,

    /// Invalid CLI/config/criteria (bad flags, failed generator config check, missing import source).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, malformed stat log, spawn failures).
    RuntimeError = 40,

    /// Interrupted by Ctrl-C; the run was still ended gracefully.
    Interrupted = 130,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Maps the generator's (absolute) exit code to the process exit code.
    #[must_use]
    pub fn from_generator(code: i32) -> Self {
        if code == 0 {
            Self::Success
        } else {
            Self::GeneratorFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_codes_map_to_exit_codes() {
        assert_eq!(ExitCode::from_generator(0), ExitCode::Success);
        assert_eq!(ExitCode::from_generator(24), ExitCode::GeneratorFailed);
        assert_eq!(ExitCode::from_generator(3), ExitCode::GeneratorFailed);
        assert_eq!(ExitCode::from_generator(15), ExitCode::GeneratorFailed);
    }
}
