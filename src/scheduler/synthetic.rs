//! Deterministic stand-in for the real executor.
//!
//! No process is spawned; scores come from a caller-supplied provider and
//! every result is marked `is_synthetic`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::executor::BenchmarkExecutor;
use super::run::BenchmarkJob;
use crate::error::JobError;
use crate::result::{ExecutionResult, ScoreSummary};

/// Supplies scores for a job without running anything.
pub trait ScoreProvider: Send + Sync {
    fn scores(&self, job: &BenchmarkJob) -> Result<ScoreSummary, JobError>;
}

impl<F> ScoreProvider for F
where
    F: Fn(&BenchmarkJob) -> Result<ScoreSummary, JobError> + Send + Sync,
{
    fn scores(&self, job: &BenchmarkJob) -> Result<ScoreSummary, JobError> {
        self(job)
    }
}

/// Executor backed by a `ScoreProvider`.
#[derive(Clone)]
pub struct SyntheticExecutor {
    provider: Arc<dyn ScoreProvider>,
    latency: Duration,
}

impl SyntheticExecutor {
    pub fn new(provider: impl ScoreProvider + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
            latency: Duration::ZERO,
        }
    }

    /// Simulated wall-clock time per job.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl std::fmt::Debug for SyntheticExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticExecutor")
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BenchmarkExecutor for SyntheticExecutor {
    async fn execute(&self, job: &BenchmarkJob) -> Result<ExecutionResult, JobError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let summary = self.provider.scores(job)?;
        Ok(ExecutionResult::synthetic(summary)?)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Fixed scores keyed by `(repository_ref, treatment_id)`.
///
/// Jobs without an entry fail with `LaunchFailed`, which makes the table
/// usable for failure injection.
#[derive(Debug, Clone)]
pub struct ScoreTable {
    scores: HashMap<(String, Option<String>), f64>,
    tasks_per_run: u64,
}

impl ScoreTable {
    pub fn new() -> Self {
        Self {
            scores: HashMap::new(),
            tasks_per_run: DEFAULT_TASKS_PER_RUN,
        }
    }

    pub fn with_baseline(mut self, repository_ref: impl Into<String>, score: f64) -> Self {
        self.scores.insert((repository_ref.into(), None), score);
        self
    }

    pub fn with_treated(
        mut self,
        repository_ref: impl Into<String>,
        treatment_id: impl Into<String>,
        score: f64,
    ) -> Self {
        self.scores
            .insert((repository_ref.into(), Some(treatment_id.into())), score);
        self
    }
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreProvider for ScoreTable {
    fn scores(&self, job: &BenchmarkJob) -> Result<ScoreSummary, JobError> {
        let key = (job.repository_ref.clone(), job.treatment_id.clone());
        let score = self.scores.get(&key).copied().ok_or_else(|| {
            JobError::LaunchFailed(format!(
                "no synthetic score for {} ({})",
                job.repository_ref,
                job.treatment_label()
            ))
        })?;
        Ok(summary_for(score, self.tasks_per_run))
    }
}

/// Suite size assumed when deriving counts from an accuracy.
pub const DEFAULT_TASKS_PER_RUN: u64 = 100;

/// Pseudo-random but reproducible scores derived from a SHA-256 of the
/// repository, the treatment and a salt.
#[derive(Debug, Clone)]
pub struct HashedScores {
    salt: String,
    tasks_per_run: u64,
}

impl HashedScores {
    pub fn new(salt: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            tasks_per_run: DEFAULT_TASKS_PER_RUN,
        }
    }

    pub fn with_tasks_per_run(mut self, tasks: u64) -> Self {
        self.tasks_per_run = tasks.max(1);
        self
    }

    fn digest(&self, job: &BenchmarkJob) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update([0]);
        hasher.update(job.repository_ref.as_bytes());
        hasher.update([0]);
        // tag byte keeps a treatment named "baseline" apart from the baseline
        match &job.treatment_id {
            None => hasher.update([b'B']),
            Some(treatment) => {
                hasher.update([b'T']);
                hasher.update(treatment.as_bytes());
            }
        }
        hasher.finalize().into()
    }
}

impl Default for HashedScores {
    fn default() -> Self {
        Self::new("treatment-bench")
    }
}

impl ScoreProvider for HashedScores {
    fn scores(&self, job: &BenchmarkJob) -> Result<ScoreSummary, JobError> {
        let digest = self.digest(job);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let accuracy = (u64::from_be_bytes(head) % 10_001) as f64 / 10_000.0;

        debug!(
            repository = %job.repository_ref,
            treatment = job.treatment_label(),
            fingerprint = %hex::encode(&digest[..6]),
            accuracy,
            "Synthetic score"
        );
        Ok(summary_for(accuracy, self.tasks_per_run))
    }
}

/// Counts and pass@k consistent with `accuracy` over `tasks` tasks.
fn summary_for(accuracy: f64, tasks: u64) -> ScoreSummary {
    let clamped = accuracy.clamp(0.0, 1.0);
    let resolved = (clamped * tasks as f64).round() as u64;
    ScoreSummary {
        resolved,
        unresolved: tasks.saturating_sub(resolved),
        accuracy,
        pass_at_1: accuracy,
        pass_at_3: if accuracy.is_finite() {
            1.0 - (1.0 - clamped).powi(3)
        } else {
            accuracy
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobConfig, RawJobInputs};

    fn config() -> JobConfig {
        JobConfig::build(
            RawJobInputs::new()
                .with_model("anthropic/claude-haiku-4-5")
                .with_agent("claude-code")
                .with_output_dir("/tmp/bench/synthetic")
                .with_credential("sk-synthetic"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_synthetic_results_are_flagged() {
        let executor = SyntheticExecutor::new(ScoreTable::new().with_baseline("repo-a", 0.7));
        let result = executor
            .execute(&BenchmarkJob::baseline("repo-a", config()))
            .await
            .unwrap();

        assert!(result.is_synthetic());
        assert!((result.score() - 0.7).abs() < f64::EPSILON);
        assert_eq!(result.resolved_count(), 70);
        assert_eq!(result.unresolved_count(), 30);
    }

    #[tokio::test]
    async fn test_missing_table_entry_fails() {
        let executor = SyntheticExecutor::new(ScoreTable::new());
        let err = executor
            .execute(&BenchmarkJob::treated("repo-a", "lint", config()))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::LaunchFailed(_)));
    }

    #[tokio::test]
    async fn test_out_of_range_provider_score_rejected() {
        let executor = SyntheticExecutor::new(|_: &BenchmarkJob| {
            Ok::<_, JobError>(ScoreSummary::from_accuracy(1.4, 1, 0))
        });
        let err = executor
            .execute(&BenchmarkJob::baseline("repo-a", config()))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidScore(_)));
    }

    #[test]
    fn test_hashed_scores_are_deterministic_and_bounded() {
        let provider = HashedScores::default();
        let baseline = BenchmarkJob::baseline("repo-a", config());
        let treated = BenchmarkJob::treated("repo-a", "lint", config());

        let first = provider.scores(&baseline).unwrap();
        let second = provider.scores(&baseline).unwrap();
        assert_eq!(first, second);
        assert!((0.0..=1.0).contains(&first.accuracy));
        assert!((0.0..=1.0).contains(&first.pass_at_3));
        assert_eq!(first.resolved + first.unresolved, DEFAULT_TASKS_PER_RUN);

        let other_salt = HashedScores::new("other").scores(&baseline).unwrap();
        let treated_scores = provider.scores(&treated).unwrap();
        // distinct inputs hash apart
        assert!(first != other_salt || first != treated_scores);
    }

    #[test]
    fn test_treatment_named_baseline_is_not_the_baseline() {
        let provider = HashedScores::default();
        let baseline = BenchmarkJob::baseline("repo-a", config());
        let lookalike = BenchmarkJob::treated("repo-a", "baseline", config());

        assert_eq!(lookalike.treatment_label(), baseline.treatment_label());
        assert_ne!(provider.digest(&baseline), provider.digest(&lookalike));
    }

    #[test]
    fn test_tasks_per_run_scales_counts() {
        let provider = HashedScores::default().with_tasks_per_run(20);
        let summary = provider
            .scores(&BenchmarkJob::baseline("repo-a", config()))
            .unwrap();
        assert_eq!(summary.resolved + summary.unresolved, 20);

        let floor = HashedScores::default().with_tasks_per_run(0);
        let summary = floor
            .scores(&BenchmarkJob::baseline("repo-a", config()))
            .unwrap();
        assert_eq!(summary.resolved + summary.unresolved, 1);
    }

    #[tokio::test]
    async fn test_latency_is_simulated() {
        let executor = SyntheticExecutor::new(ScoreTable::new().with_baseline("repo-a", 0.5))
            .with_latency(Duration::from_millis(50));
        let start = std::time::Instant::now();

        executor
            .execute(&BenchmarkJob::baseline("repo-a", config()))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
