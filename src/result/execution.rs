//! Validated benchmark scores for one executor run.

use serde::{Deserialize, Serialize};

use crate::error::InvalidScore;

/// Raw summary figures reported by an executor or a synthetic provider.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub resolved: u64,
    pub unresolved: u64,
    pub accuracy: f64,
    pub pass_at_1: f64,
    pub pass_at_3: f64,
}

impl ScoreSummary {
    /// Summary where pass@1 and pass@3 both equal the accuracy.
    pub fn from_accuracy(accuracy: f64, resolved: u64, unresolved: u64) -> Self {
        Self {
            resolved,
            unresolved,
            accuracy,
            pass_at_1: accuracy,
            pass_at_3: accuracy,
        }
    }
}

/// Scores of one completed benchmark run.
///
/// Probability fields are always finite and within [0, 1]; `task_solved`
/// is always `resolved_count > 0`. Fields are read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExecutionResultRecord")]
pub struct ExecutionResult {
    score: f64,
    task_solved: bool,
    resolved_count: u64,
    unresolved_count: u64,
    pass_at_1: f64,
    pass_at_3: f64,
    is_synthetic: bool,
}

impl ExecutionResult {
    /// Builds a result decoded from the real executor's output.
    pub(crate) fn from_executor(summary: ScoreSummary) -> Result<Self, InvalidScore> {
        Self::validated(summary, false)
    }

    /// Builds a result from a deterministic stand-in provider.
    pub fn synthetic(summary: ScoreSummary) -> Result<Self, InvalidScore> {
        Self::validated(summary, true)
    }

    fn validated(summary: ScoreSummary, is_synthetic: bool) -> Result<Self, InvalidScore> {
        check_probability("accuracy", summary.accuracy)?;
        check_probability("pass@1", summary.pass_at_1)?;
        check_probability("pass@3", summary.pass_at_3)?;

        Ok(Self {
            score: summary.accuracy,
            task_solved: summary.resolved > 0,
            resolved_count: summary.resolved,
            unresolved_count: summary.unresolved,
            pass_at_1: summary.pass_at_1,
            pass_at_3: summary.pass_at_3,
            is_synthetic,
        })
    }

    /// Overall accuracy in [0, 1].
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn task_solved(&self) -> bool {
        self.task_solved
    }

    pub fn resolved_count(&self) -> u64 {
        self.resolved_count
    }

    pub fn unresolved_count(&self) -> u64 {
        self.unresolved_count
    }

    pub fn pass_at_1(&self) -> f64 {
        self.pass_at_1
    }

    pub fn pass_at_3(&self) -> f64 {
        self.pass_at_3
    }

    pub fn is_synthetic(&self) -> bool {
        self.is_synthetic
    }
}

fn check_probability(field: &'static str, value: f64) -> Result<(), InvalidScore> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(InvalidScore { field, value })
    }
}

/// Serialized form; re-validated on load so stored runs keep the invariants.
#[derive(Deserialize)]
struct ExecutionResultRecord {
    score: f64,
    resolved_count: u64,
    unresolved_count: u64,
    pass_at_1: f64,
    pass_at_3: f64,
    #[serde(default)]
    is_synthetic: bool,
}

impl TryFrom<ExecutionResultRecord> for ExecutionResult {
    type Error = InvalidScore;

    fn try_from(record: ExecutionResultRecord) -> Result<Self, Self::Error> {
        let summary = ScoreSummary {
            resolved: record.resolved_count,
            unresolved: record.unresolved_count,
            accuracy: record.score,
            pass_at_1: record.pass_at_1,
            pass_at_3: record.pass_at_3,
        };
        Self::validated(summary, record.is_synthetic)
    }
}
