pub mod step;
pub mod result;
pub mod launcher;
pub mod executor;

pub use step::Step;
pub use result::{AbortCause, RunResult, RunState, RunStatus, StepResult};
pub use launcher::{OutputMode, ProcessLauncher, RunningProcess, TokioLauncher};
pub use executor::{RunObserver, StepRunner};
