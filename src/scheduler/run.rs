//! Jobs, run records and batch outcomes.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;
use crate::job::JobConfig;
use crate::result::ExecutionResult;

/// One unit of work: a repository, the treatment applied to it (none for a
/// baseline) and the validated executor configuration.
#[derive(Debug, Clone)]
pub struct BenchmarkJob {
    pub repository_ref: String,
    pub treatment_id: Option<String>,
    pub config: JobConfig,
}

impl BenchmarkJob {
    /// Creates a baseline job.
    pub fn baseline(repository_ref: impl Into<String>, config: JobConfig) -> Self {
        Self {
            repository_ref: repository_ref.into(),
            treatment_id: None,
            config,
        }
    }

    /// Creates a job for a treated repository.
    pub fn treated(
        repository_ref: impl Into<String>,
        treatment_id: impl Into<String>,
        config: JobConfig,
    ) -> Self {
        Self {
            repository_ref: repository_ref.into(),
            treatment_id: Some(treatment_id.into()),
            config,
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.treatment_id.is_none()
    }

    /// Treatment label for logs; `"baseline"` when untreated.
    pub fn treatment_label(&self) -> &str {
        self.treatment_id.as_deref().unwrap_or("baseline")
    }
}

/// Category of a per-job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    LaunchFailed,
    NonZeroExit,
    TimedOut,
    DecodeFailed,
    Unresponsive,
    Panicked,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::LaunchFailed => "launch_failed",
            FailureKind::NonZeroExit => "non_zero_exit",
            FailureKind::TimedOut => "timed_out",
            FailureKind::DecodeFailed => "decode_failed",
            FailureKind::Unresponsive => "unresponsive",
            FailureKind::Panicked => "panicked",
        }
    }
}

impl From<&JobError> for FailureKind {
    fn from(error: &JobError) -> Self {
        match error {
            JobError::LaunchFailed(_) => FailureKind::LaunchFailed,
            JobError::NonZeroExit { .. } => FailureKind::NonZeroExit,
            JobError::TimedOut(_) => FailureKind::TimedOut,
            JobError::Decode(_) | JobError::InvalidScore(_) => FailureKind::DecodeFailed,
            JobError::Unresponsive(_) => FailureKind::Unresponsive,
            JobError::Panicked(_) => FailureKind::Panicked,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Either the scores of a completed run or why it failed; never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { result: ExecutionResult },
    Failed { kind: FailureKind, error: String },
}

/// Immutable record of one finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    run_id: Uuid,
    repository_ref: String,
    treatment_id: Option<String>,
    started_at: DateTime<Utc>,
    duration_ms: u64,
    outcome: RunOutcome,
}

impl BenchmarkRun {
    /// Record of a run that produced scores.
    pub fn completed(
        repository_ref: impl Into<String>,
        treatment_id: Option<String>,
        result: ExecutionResult,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self::new(
            repository_ref.into(),
            treatment_id,
            started_at,
            duration,
            RunOutcome::Completed { result },
        )
    }

    /// Record of a run that failed before producing scores.
    pub fn failed(
        repository_ref: impl Into<String>,
        treatment_id: Option<String>,
        kind: FailureKind,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self::new(
            repository_ref.into(),
            treatment_id,
            started_at,
            duration,
            RunOutcome::Failed {
                kind,
                error: error.into(),
            },
        )
    }

    fn new(
        repository_ref: String,
        treatment_id: Option<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
        outcome: RunOutcome,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            repository_ref,
            treatment_id,
            started_at,
            duration_ms: duration.as_millis() as u64,
            outcome,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn repository_ref(&self) -> &str {
        &self.repository_ref
    }

    /// Treatment applied, or `None` for a baseline run.
    pub fn treatment_id(&self) -> Option<&str> {
        self.treatment_id.as_deref()
    }

    pub fn is_baseline(&self) -> bool {
        self.treatment_id.is_none()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn outcome(&self) -> &RunOutcome {
        &self.outcome
    }

    /// Scores, present only for completed runs.
    pub fn result(&self) -> Option<&ExecutionResult> {
        match &self.outcome {
            RunOutcome::Completed { result } => Some(result),
            RunOutcome::Failed { .. } => None,
        }
    }

    /// Failure reason, present only for failed runs.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Completed { .. } => None,
            RunOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            RunOutcome::Completed { .. } => None,
            RunOutcome::Failed { kind, .. } => Some(*kind),
        }
    }
}

/// A failed job: the repository it belonged to, its classification and the
/// failed run record.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub reason: String,
    pub run: BenchmarkRun,
}

impl JobFailure {
    pub fn repository_ref(&self) -> &str {
        self.run.repository_ref()
    }

    pub fn treatment_id(&self) -> Option<&str> {
        self.run.treatment_id()
    }
}

/// Coarse classification of a finished batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchVerdict {
    AllSucceeded,
    PartialFailure,
    TotalFailure,
    Empty,
}

/// Everything a batch produced. Successes and failures are unordered with
/// respect to dispatch order.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub successes: Vec<BenchmarkRun>,
    pub failures: Vec<JobFailure>,
    pub stats: super::worker_pool::PoolStats,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn verdict(&self) -> BatchVerdict {
        match (self.successes.len(), self.failures.len()) {
            (0, 0) => BatchVerdict::Empty,
            (_, 0) => BatchVerdict::AllSucceeded,
            (0, _) => BatchVerdict::TotalFailure,
            _ => BatchVerdict::PartialFailure,
        }
    }

    /// All run records, successful first, then failed.
    pub fn all_runs(&self) -> Vec<BenchmarkRun> {
        self.successes
            .iter()
            .cloned()
            .chain(self.failures.iter().map(|f| f.run.clone()))
            .collect()
    }
}
