use crate::error::RunError;
use crate::pipeline::{AbortCause, ProcessLauncher, RunResult, RunState, RunStatus, Step, StepResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Hooks for following a run as it progresses. All methods default to no-ops.
pub trait RunObserver: Send + Sync {
    fn state_changed(&self, _state: RunState) {}

    fn step_started(&self, _index: usize, _total: usize, _step: &Step) {}

    fn step_finished(&self, _index: usize, _step: &Step, _result: &StepResult) {}

    fn run_finished(&self, _result: &RunResult) {}
}

/// Executes steps one at a time over a [`ProcessLauncher`], stopping at the
/// first failure.
pub struct StepRunner<L> {
    launcher: L,
    cancel: CancellationToken,
    observer: Option<Box<dyn RunObserver>>,
}

impl<L: ProcessLauncher> StepRunner<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl RunObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Token that aborts the current run when cancelled.
    ///
    /// Cancellation is permanent for this runner: later runs abort before
    /// launching their first step.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self, steps: &[Step]) -> Result<RunResult, RunError> {
        if steps.is_empty() {
            return Err(RunError::EmptySequence);
        }

        self.transition(RunState::Idle);

        let total = steps.len();
        let mut results = Vec::with_capacity(total);
        info!("Starting run with {} steps", total);

        for (index, step) in steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Run cancelled before step {}/{}", index + 1, total);
                return Ok(self.abort(results, index, AbortCause::Cancelled));
            }

            self.transition(RunState::Running(index));
            if let Some(observer) = &self.observer {
                observer.step_started(index, total, step);
            }
            info!("Executing step {}/{}: {}", index + 1, total, step.name());

            let mut process = match self.launcher.launch(step).await {
                Ok(process) => process,
                Err(e) => {
                    warn!("Step {}/{} could not start: {}", index + 1, total, e);
                    return Ok(self.abort(results, index, AbortCause::LaunchFailure(e.to_string())));
                }
            };

            let waited = tokio::select! {
                result = process.wait() => Some(result),
                () = self.cancel.cancelled() => None,
            };

            let result = match waited {
                Some(Ok(result)) => result,
                Some(Err(e)) => {
                    warn!("Step {}/{} failed while waiting: {}", index + 1, total, e);
                    return Ok(self.abort(results, index, AbortCause::WaitFailure(e.to_string())));
                }
                None => {
                    warn!("Cancellation requested, killing step {}/{}", index + 1, total);
                    if let Err(e) = process.kill().await {
                        warn!("Failed to kill step {}/{}: {}", index + 1, total, e);
                    }
                    return Ok(self.abort(results, index, AbortCause::Cancelled));
                }
            };

            debug!(
                "Step {}/{} exited with {} after {:?}",
                index + 1,
                total,
                result.exit_code,
                result.duration
            );
            if let Some(observer) = &self.observer {
                observer.step_finished(index, step, &result);
            }

            let exit_code = result.exit_code;
            results.push(result);

            if exit_code != 0 {
                warn!("Step {}/{} failed with exit code {}", index + 1, total, exit_code);
                return Ok(self.abort(results, index, AbortCause::NonZeroExit(exit_code)));
            }

            info!("Step {}/{} completed successfully", index + 1, total);
        }

        info!("Run completed successfully");
        self.transition(RunState::Completed);
        Ok(self.finish(RunResult {
            results,
            status: RunStatus::Completed,
        }))
    }

    /// Drive [`run`](Self::run) on a fresh current-thread runtime.
    ///
    /// Returns [`RunError::InsideRuntime`] when called from async code; use
    /// `run` there instead.
    pub fn run_blocking(&self, steps: &[Step]) -> Result<RunResult, RunError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(RunError::InsideRuntime);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(RunError::Runtime)?;
        runtime.block_on(self.run(steps))
    }

    fn abort(&self, results: Vec<StepResult>, index: usize, cause: AbortCause) -> RunResult {
        self.transition(RunState::Aborted(index));
        self.finish(RunResult {
            results,
            status: RunStatus::Aborted { index, cause },
        })
    }

    fn finish(&self, result: RunResult) -> RunResult {
        if let Some(observer) = &self.observer {
            observer.run_finished(&result);
        }
        result
    }

    fn transition(&self, state: RunState) {
        debug!("Runner state: {:?}", state);
        if let Some(observer) = &self.observer {
            observer.state_changed(state);
        }
    }
}
