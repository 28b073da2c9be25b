use std::fmt;
use std::time::Duration;

/// Terminal state of a render attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Succeeded,
    Failed,
}

/// Why a render attempt ended in `RenderStatus::Failed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderFailure {
    /// The engine ran and exited with a non-zero code (`None` if killed by a signal)
    NonZeroExit(Option<i32>),
    /// The engine could not be started
    Spawn,
    /// The engine exceeded the configured deadline and was killed
    TimedOut(Duration),
    /// The caller cancelled the render and the engine was killed
    Cancelled,
    /// Waiting on the engine or reading its output failed
    Io,
}

impl fmt::Display for RenderFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RenderFailure::NonZeroExit(Some(code)) => write!(f, "engine exited with code {}", code),
            RenderFailure::NonZeroExit(None) => write!(f, "engine terminated by signal"),
            RenderFailure::Spawn => write!(f, "engine could not be started"),
            RenderFailure::TimedOut(limit) => {
                write!(f, "engine timed out after {:.1}s", limit.as_secs_f64())
            }
            RenderFailure::Cancelled => write!(f, "render cancelled"),
            RenderFailure::Io => write!(f, "failed to communicate with engine"),
        }
    }
}

/// Outcome of invoking the rendering engine once
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub status: RenderStatus,
    /// Captured standard error on a non-zero exit, or the error message for
    /// spawn/communication failures
    pub diagnostic_output: Option<String>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub failure: Option<RenderFailure>,
    pub duration: Duration,
}

impl RenderResult {
    pub fn succeeded(exit_code: Option<i32>, stdout: String, duration: Duration) -> Self {
        Self {
            status: RenderStatus::Succeeded,
            diagnostic_output: None,
            exit_code,
            stdout,
            failure: None,
            duration,
        }
    }

    pub fn failed(
        failure: RenderFailure,
        diagnostic_output: impl Into<String>,
        exit_code: Option<i32>,
        stdout: String,
        duration: Duration,
    ) -> Self {
        Self {
            status: RenderStatus::Failed,
            diagnostic_output: Some(diagnostic_output.into()),
            exit_code,
            stdout,
            failure: Some(failure),
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RenderStatus::Succeeded
    }
}
