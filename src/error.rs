use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that prevent a run from producing a [`RunResult`](crate::RunResult).
///
/// Failures of individual steps are not errors; they end the run with
/// [`RunStatus::Aborted`](crate::RunStatus::Aborted).
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no steps to run")]
    EmptySequence,

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("run_blocking called from inside an async runtime")]
    InsideRuntime,
}

/// A step's program could not be started.
#[derive(Debug, Error)]
#[error("failed to launch `{program}`: {source}")]
pub struct LaunchError {
    pub program: String,
    #[source]
    pub source: io::Error,
}

impl LaunchError {
    pub fn new(program: impl Into<String>, source: io::Error) -> Self {
        Self {
            program: program.into(),
            source,
        }
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}
