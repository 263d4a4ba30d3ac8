//! Secure launch of the benchmark executor as a child process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::environment::ChildEnvironment;
use crate::error::JobError;
use crate::job::JobConfig;

/// File inside the output directory that receives the child's stdout.
pub const STDOUT_LOG: &str = "executor.stdout.log";

/// File inside the output directory that receives the child's stderr.
pub const STDERR_LOG: &str = "executor.stderr.log";

/// Bytes of stderr kept on a non-zero exit.
const STDERR_TAIL_BYTES: usize = 2000;

/// How one executor invocation ended. Exactly one variant per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Success { exit_code: i32 },
    NonZeroExit { code: i32, stderr_tail: String },
    TimedOut { after: Duration },
    LaunchFailed { reason: String },
}

impl ProcessOutcome {
    /// Returns true for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Success { .. })
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::Success { .. } => "success",
            ProcessOutcome::NonZeroExit { .. } => "non_zero_exit",
            ProcessOutcome::TimedOut { .. } => "timed_out",
            ProcessOutcome::LaunchFailed { .. } => "launch_failed",
        }
    }

    /// Converts every non-success outcome into the matching `JobError`.
    pub fn into_result(self) -> Result<(), JobError> {
        match self {
            ProcessOutcome::Success { .. } => Ok(()),
            ProcessOutcome::NonZeroExit { code, stderr_tail } => {
                Err(JobError::NonZeroExit { code, stderr_tail })
            }
            ProcessOutcome::TimedOut { after } => Err(JobError::TimedOut(after)),
            ProcessOutcome::LaunchFailed { reason } => Err(JobError::LaunchFailed(reason)),
        }
    }
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessOutcome::Success { exit_code } => write!(f, "success (exit {exit_code})"),
            ProcessOutcome::NonZeroExit { code, .. } => write!(f, "non-zero exit ({code})"),
            ProcessOutcome::TimedOut { after } => write!(f, "timed out after {after:?}"),
            ProcessOutcome::LaunchFailed { reason } => write!(f, "launch failed: {reason}"),
        }
    }
}

/// Outcome plus wall-clock duration of one invocation.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub outcome: ProcessOutcome,
    pub duration: Duration,
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Launches the executor with a sanitized environment and a hard timeout.
///
/// Every call spawns at most one process and waits for it to be reaped
/// before returning, whether it exited, timed out, or could not start.
#[derive(Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    env_lookup: EnvLookup,
}

impl ProcessRunner {
    /// Creates a runner for `program` that copies `PATH`/`HOME` from the host.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            env_lookup: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Replaces the source of the inherited `PATH`/`HOME` values.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env_lookup = Arc::new(lookup);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Builds the environment the child will receive.
    pub fn environment(&self, config: &JobConfig) -> ChildEnvironment {
        ChildEnvironment::from_lookup(config.credential(), |name| (self.env_lookup)(name))
    }

    /// Runs the executor once for `config` with the given arguments.
    pub async fn run(&self, config: &JobConfig, args: &[String]) -> ProcessReport {
        let start = Instant::now();
        let outcome = self.run_inner(config, args).await;
        let duration = start.elapsed();

        info!(
            program = %self.program.display(),
            outcome = outcome.label(),
            duration_ms = duration.as_millis() as u64,
            "Executor finished"
        );

        ProcessReport { outcome, duration }
    }

    async fn run_inner(&self, config: &JobConfig, args: &[String]) -> ProcessOutcome {
        let secret = config.credential().expose();
        if args.iter().any(|arg| arg.contains(secret)) {
            return ProcessOutcome::LaunchFailed {
                reason: "credential must not appear in the argument list".to_string(),
            };
        }

        let output_dir = config.output_dir();
        if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
            return ProcessOutcome::LaunchFailed {
                reason: format!(
                    "failed to create output directory {}: {}",
                    output_dir.display(),
                    e
                ),
            };
        }

        let stderr_path = output_dir.join(STDERR_LOG);
        let (stdout, stderr) = match open_log_files(output_dir, &stderr_path) {
            Ok(files) => files,
            Err(reason) => return ProcessOutcome::LaunchFailed { reason },
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .current_dir(output_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        self.environment(config).apply(&mut cmd);

        debug!(
            program = %self.program.display(),
            args = ?args,
            output_dir = %output_dir.display(),
            "Launching executor"
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ProcessOutcome::LaunchFailed {
                    reason: format!("{}: {}", self.program.display(), e),
                }
            }
        };

        let timeout = config.timeout();
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => ProcessOutcome::Success { exit_code: 0 },
            Ok(Ok(status)) => {
                let code = status.code().unwrap_or(-1);
                let stderr_tail = read_tail(&stderr_path, STDERR_TAIL_BYTES).await;
                ProcessOutcome::NonZeroExit { code, stderr_tail }
            }
            Ok(Err(e)) => {
                // The child may still be alive if waiting itself failed.
                if let Err(kill_error) = child.kill().await {
                    warn!(
                        program = %self.program.display(),
                        error = %kill_error,
                        "Failed to kill executor after wait error"
                    );
                }
                ProcessOutcome::LaunchFailed {
                    reason: format!("failed to wait for executor: {e}"),
                }
            }
            Err(_) => {
                warn!(
                    program = %self.program.display(),
                    timeout_secs = timeout.as_secs_f64(),
                    "Executor timed out, killing"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out executor");
                }
                ProcessOutcome::TimedOut { after: timeout }
            }
        }
    }
}

impl fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

fn open_log_files(output_dir: &Path, stderr_path: &Path) -> Result<(Stdio, Stdio), String> {
    let stdout_path = output_dir.join(STDOUT_LOG);
    let stdout = std::fs::File::create(&stdout_path)
        .map_err(|e| format!("failed to create {}: {}", stdout_path.display(), e))?;
    let stderr = std::fs::File::create(stderr_path)
        .map_err(|e| format!("failed to create {}: {}", stderr_path.display(), e))?;
    Ok((Stdio::from(stdout), Stdio::from(stderr)))
}

/// Reads at most the last `max` bytes of a log file.
async fn read_tail(path: &Path, max: usize) -> String {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(_) => return String::new(),
    };
    let start = bytes.len().saturating_sub(max);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}
