//! Error types for supervised runs

use thiserror::Error;

/// Terminal failure of a supervised run
///
/// `Clone` so the same value can be delivered to every [`wait`]
/// observer of a run.
///
/// [`wait`]: crate::Process::wait
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunnerError {
    /// The process could not be launched at all
    #[error("runner '{name}' cannot start a process because of failure: {reason}")]
    StartFailed { name: String, reason: String },

    /// The process started but never emitted the start check within the
    /// deadline; it was killed and its captured output is attached
    #[error("runner '{name}' did not see '{marker}' in command's output within the deadline. output: {output}")]
    StartTimeout {
        name: String,
        marker: String,
        output: String,
    },

    /// The process exited on its own with a non-zero code
    #[error("runner '{name}' exit with status code: {code}")]
    AbnormalExit { name: String, code: i32 },
}

impl RunnerError {
    /// Exit code carried by an [`AbnormalExit`](RunnerError::AbnormalExit),
    /// if that is what this error is
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunnerError::AbnormalExit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Terminal outcome of a supervised run; `Ok(())` means exit code 0
pub type RunOutcome = Result<(), RunnerError>;
