pub mod config;
pub mod config_finder;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod settings;
pub mod validator;

pub use error::{ConfigError, LaunchError, RunError};
pub use pipeline::{
    AbortCause, OutputMode, ProcessLauncher, RunObserver, RunResult, RunState, RunStatus,
    RunningProcess, Step, StepResult, StepRunner, TokioLauncher,
};
