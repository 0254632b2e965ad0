use std::fmt;
use std::time::Duration;

/// Outcome of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub exit_code: i32,
    /// Captured standard output; `None` when output was not captured.
    pub stdout: Option<String>,
    /// Captured standard error; `None` when output was not captured.
    pub stderr: Option<String>,
    pub duration: Duration,
}

impl StepResult {
    pub fn new(exit_code: i32, duration: Duration) -> Self {
        Self {
            exit_code,
            stdout: None,
            stderr: None,
            duration,
        }
    }

    pub fn with_output(mut self, stdout: Option<String>, stderr: Option<String>) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Why a run stopped before its last step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortCause {
    /// The process ran and exited with this non-zero code.
    NonZeroExit(i32),
    /// The program could not be started.
    LaunchFailure(String),
    /// The process started but waiting on it failed.
    WaitFailure(String),
    Cancelled,
}

impl fmt::Display for AbortCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortCause::NonZeroExit(code) => write!(f, "exited with code {}", code),
            AbortCause::LaunchFailure(msg) => write!(f, "launch failed: {}", msg),
            AbortCause::WaitFailure(msg) => write!(f, "lost track of process: {}", msg),
            AbortCause::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Aborted { index: usize, cause: AbortCause },
}

/// Aggregate outcome of one `run` invocation.
///
/// `results[i]` belongs to step `i`. There is never a result past the
/// aborting index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub results: Vec<StepResult>,
    pub status: RunStatus,
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }

    /// Result of the step that aborted the run, if it got far enough to have one.
    pub fn failed_result(&self) -> Option<&StepResult> {
        match self.status {
            RunStatus::Aborted { index, .. } => self.results.get(index),
            RunStatus::Completed => None,
        }
    }

    /// Process exit code for a CLI wrapping this run.
    pub fn exit_code(&self) -> i32 {
        match &self.status {
            RunStatus::Completed => 0,
            RunStatus::Aborted { cause, .. } => match cause {
                AbortCause::NonZeroExit(code) => *code,
                AbortCause::LaunchFailure(_) | AbortCause::WaitFailure(_) => 1,
                AbortCause::Cancelled => 130,
            },
        }
    }
}

/// Runner lifecycle: `Idle -> Running(i) -> {Running(i+1) | Aborted(i) | Completed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running(usize),
    Aborted(usize),
    Completed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Aborted(_) | RunState::Completed)
    }
}
