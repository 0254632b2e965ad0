use crate::pipeline::{RunObserver, RunResult, Step, StepResult};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal progress for a run: a spinner showing the current step.
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{pos}/{len}] {msg} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar }
    }

    /// Observer that draws nothing, for tests and non-terminal output.
    pub fn hidden(total: usize) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total as u64);
        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl RunObserver for ProgressObserver {
    fn step_started(&self, index: usize, _total: usize, step: &Step) {
        self.bar.set_position(index as u64);
        self.bar.set_message(step.name().to_string());
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn step_finished(&self, index: usize, step: &Step, result: &StepResult) {
        if result.success() {
            self.bar.set_position(index as u64 + 1);
            self.bar
                .println(format!("✓ {} ({:.1}s)", step.name(), result.duration.as_secs_f64()));
        } else {
            self.bar
                .println(format!("✗ {} (exit code {})", step.name(), result.exit_code));
        }
    }

    fn run_finished(&self, result: &RunResult) {
        if result.is_completed() {
            self.bar.finish_with_message("All steps completed");
        } else {
            self.bar.abandon_with_message("Run aborted");
        }
    }
}
