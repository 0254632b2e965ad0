use crate::error::LaunchError;
use crate::pipeline::{Step, StepResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// A started process the runner can wait on or kill.
#[async_trait]
pub trait RunningProcess: Send {
    /// Wait for the process to exit and collect its result.
    async fn wait(&mut self) -> io::Result<StepResult>;

    /// Kill the process and reap it.
    async fn kill(&mut self) -> io::Result<()>;
}

/// Starts the process described by a [`Step`].
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, step: &Step) -> Result<Box<dyn RunningProcess>, LaunchError>;
}

/// What happens to a child's stdout and stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Share the parent's terminal; nothing is captured.
    #[default]
    Inherit,
    /// Pipe and collect the output.
    Capture,
    /// Pipe, log each line as it arrives, and collect.
    Stream,
}

/// Launcher backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioLauncher {
    output: OutputMode,
}

impl TokioLauncher {
    pub fn new(output: OutputMode) -> Self {
        Self { output }
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output
    }

    fn command(&self, step: &Step) -> Command {
        let mut command = Command::new(step.program());
        command
            .args(step.arguments())
            .envs(step.env_overrides())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(dir) = step.working_dir() {
            command.current_dir(dir);
        }

        match self.output {
            OutputMode::Inherit => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Capture | OutputMode::Stream => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        command
    }
}

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn launch(&self, step: &Step) -> Result<Box<dyn RunningProcess>, LaunchError> {
        debug!("Spawning: {}", step.command_line());
        if let Some(dir) = step.working_dir() {
            debug!("Working directory: {}", dir.display());
        }
        if !step.env_overrides().is_empty() {
            debug!("Environment overrides: {:?}", step.env_overrides().keys().collect::<Vec<_>>());
        }

        let mut child = self
            .command(step)
            .spawn()
            .map_err(|e| LaunchError::new(step.program(), e))?;

        let (stdout, stderr) = match self.output {
            OutputMode::Inherit => (None, None),
            OutputMode::Capture => (
                child.stdout.take().map(|out| OutputReader::spawn(|buf| read_all(out, buf))),
                child.stderr.take().map(|err| OutputReader::spawn(|buf| read_all(err, buf))),
            ),
            OutputMode::Stream => {
                let name = step.name().to_string();
                let err_name = name.clone();
                (
                    child.stdout.take().map(|out| {
                        OutputReader::spawn(|buf| forward_lines(out, buf, name, "stdout"))
                    }),
                    child.stderr.take().map(|err| {
                        OutputReader::spawn(|buf| forward_lines(err, buf, err_name, "stderr"))
                    }),
                )
            }
        };

        Ok(Box::new(TokioProcess {
            child,
            stdout,
            stderr,
            started: Instant::now(),
            exited: false,
        }))
    }
}

/// How long output pipes may stay open after the process itself has exited.
///
/// A background grandchild can inherit the pipes and hold them open
/// indefinitely; past this deadline the readers are aborted and whatever was
/// read so far is kept.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

type OutputBuffer = Arc<Mutex<Vec<u8>>>;

/// A pipe reader task and the buffer it appends to.
struct OutputReader {
    buffer: OutputBuffer,
    task: JoinHandle<io::Result<()>>,
}

impl OutputReader {
    fn spawn<F, Fut>(read: F) -> Self
    where
        F: FnOnce(OutputBuffer) -> Fut,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        let buffer = OutputBuffer::default();
        let task = tokio::spawn(read(Arc::clone(&buffer)));
        Self { buffer, task }
    }

    async fn finish(mut self) -> io::Result<String> {
        match timeout(OUTPUT_DRAIN_TIMEOUT, &mut self.task).await {
            Ok(joined) => joined.map_err(io::Error::other)??,
            Err(_) => {
                warn!(
                    "Output still open {:?} after exit, keeping what was read",
                    OUTPUT_DRAIN_TIMEOUT
                );
                self.task.abort();
            }
        }

        let bytes = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Drop for OutputReader {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct TokioProcess {
    child: Child,
    stdout: Option<OutputReader>,
    stderr: Option<OutputReader>,
    started: Instant,
    exited: bool,
}

#[async_trait]
impl RunningProcess for TokioProcess {
    async fn wait(&mut self) -> io::Result<StepResult> {
        let status = self.child.wait().await?;
        self.exited = true;
        let duration = self.started.elapsed();

        let stdout = finish_output(self.stdout.take()).await?;
        let stderr = finish_output(self.stderr.take()).await?;

        Ok(StepResult::new(exit_code(status), duration).with_output(stdout, stderr))
    }

    async fn kill(&mut self) -> io::Result<()> {
        // An exited child is already reaped; only the readers remain.
        if self.exited {
            self.stdout = None;
            self.stderr = None;
            return Ok(());
        }
        self.child.kill().await
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R, buffer: OutputBuffer) -> io::Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(&chunk[..n]);
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(
    reader: R,
    buffer: OutputBuffer,
    step: String,
    stream: &'static str,
) -> io::Result<()> {
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        info!(step = %step, stream, "{}", line);
        let mut collected = buffer.lock().unwrap_or_else(|e| e.into_inner());
        collected.extend_from_slice(line.as_bytes());
        collected.push(b'\n');
    }
    Ok(())
}

async fn finish_output(reader: Option<OutputReader>) -> io::Result<Option<String>> {
    match reader {
        Some(reader) => reader.finish().await.map(Some),
        None => Ok(None),
    }
}

/// Exit code of a finished process; signals map to `128 + signal` on Unix.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Step {
        Step::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_capture_collects_stdout_and_stderr() {
        let launcher = TokioLauncher::new(OutputMode::Capture);
        let mut process = launcher
            .launch(&sh("echo out; echo err >&2"))
            .await
            .unwrap();
        let result = process.wait().await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.as_deref(), Some("out\n"));
        assert_eq!(result.stderr.as_deref(), Some("err\n"));
    }

    #[tokio::test]
    async fn test_stream_also_collects_lines() {
        let launcher = TokioLauncher::new(OutputMode::Stream);
        let mut process = launcher.launch(&sh("printf 'a\\nb\\n'")).await.unwrap();
        let result = process.wait().await.unwrap();

        assert_eq!(result.stdout.as_deref(), Some("a\nb\n"));
    }

    #[tokio::test]
    async fn test_inherit_captures_nothing() {
        let launcher = TokioLauncher::new(OutputMode::Inherit);
        let mut process = launcher.launch(&sh("exit 0")).await.unwrap();
        let result = process.wait().await.unwrap();

        assert!(result.stdout.is_none());
        assert!(result.stderr.is_none());
    }

    #[tokio::test]
    async fn test_non_zero_exit_code_is_reported() {
        let launcher = TokioLauncher::new(OutputMode::Capture);
        let mut process = launcher.launch(&sh("exit 7")).await.unwrap();
        assert_eq!(process.wait().await.unwrap().exit_code, 7);
    }

    #[tokio::test]
    async fn test_cwd_and_env_are_applied() {
        let dir = TempDir::new().unwrap();
        let step = sh("pwd; echo $STEPRUNNER_TEST_VAR")
            .cwd(dir.path())
            .env("STEPRUNNER_TEST_VAR", "hello");

        let launcher = TokioLauncher::new(OutputMode::Capture);
        let result = launcher.launch(&step).await.unwrap().wait().await.unwrap();
        let stdout = result.stdout.unwrap();
        let mut lines = stdout.lines();

        let reported = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
        assert_eq!(lines.next(), Some("hello"));
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let launcher = TokioLauncher::default();
        let err = launcher
            .launch(&Step::new("steprunner-definitely-not-a-program"))
            .await
            .err()
            .unwrap();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(err.program, "steprunner-definitely-not-a-program");
    }

    #[tokio::test]
    async fn test_background_child_does_not_hold_up_result() {
        let launcher = TokioLauncher::new(OutputMode::Capture);
        let started = Instant::now();
        let mut process = launcher
            .launch(&sh("echo before; sleep 5 & exit 0"))
            .await
            .unwrap();
        let result = process.wait().await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.as_deref(), Some("before\n"));
        assert!(started.elapsed() < Duration::from_secs(4));
        process.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_killed_process_reports_signal_code() {
        let launcher = TokioLauncher::new(OutputMode::Capture);
        let mut process = launcher.launch(&sh("kill -9 $$")).await.unwrap();
        assert_eq!(process.wait().await.unwrap().exit_code, 128 + 9);
    }
}
