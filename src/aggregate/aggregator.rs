//! Cross-repository aggregation of treated-vs-baseline score deltas.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::stats::Summary;
use crate::error::AggregationError;
use crate::metrics::MetricsCollector;
use crate::scheduler::BenchmarkRun;

/// Default `abs(mean_delta)` above which a treatment is flagged.
pub const DEFAULT_SIGNIFICANCE_THRESHOLD: f64 = 0.05;

/// Label carried by every snapshot: significance is a fixed-threshold
/// heuristic, not a hypothesis test.
pub const SIGNIFICANCE_METHOD: &str = "threshold_heuristic";

/// Delta statistics for one treatment across repositories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStatistic {
    pub treatment_id: String,
    pub mean_delta: f64,
    pub median_delta: f64,
    /// Sample standard deviation; 0.0 for a single delta.
    pub std_delta: f64,
    /// Number of deltas contributing; always > 0.
    pub sample_size: usize,
    /// `abs(mean_delta) > threshold`. Heuristic only.
    pub significant: bool,
    /// Treated runs dropped because their repository had no baseline.
    pub excluded_runs: usize,
}

/// Why a successful run was left out of a treatment's sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    MissingBaseline,
}

/// A treated run that did not contribute a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub run_id: Uuid,
    pub repository_ref: String,
    pub treatment_id: String,
    pub reason: ExclusionReason,
}

/// One immutable aggregation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSnapshot {
    pub snapshot_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Distinct repositories with at least one successful run.
    pub repository_count: usize,
    /// Sorted by `mean_delta` descending, ties by `treatment_id`.
    pub rankings: Vec<AggregatedStatistic>,
    pub exclusions: Vec<Exclusion>,
    /// Runs ignored because they carried an error.
    pub failed_runs: usize,
    pub significance_method: String,
    pub significance_threshold: f64,
}

impl BenchmarkSnapshot {
    pub fn statistic(&self, treatment_id: &str) -> Option<&AggregatedStatistic> {
        self.rankings.iter().find(|s| s.treatment_id == treatment_id)
    }

    pub fn excluded_count(&self) -> usize {
        self.exclusions.len()
    }
}

/// `true` iff `abs(mean_delta)` is strictly above `threshold`.
pub fn is_significant(mean_delta: f64, threshold: f64) -> bool {
    mean_delta.abs() > threshold
}

/// Builds snapshots from finished runs. Never mutates its input.
#[derive(Debug, Clone)]
pub struct Aggregator {
    threshold: f64,
    metrics: MetricsCollector,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIGNIFICANCE_THRESHOLD,
            metrics: MetricsCollector::new(),
        }
    }
}

impl Aggregator {
    /// Creates an aggregator with a significance threshold in (0, 1).
    pub fn new(threshold: f64) -> Result<Self, AggregationError> {
        if !(threshold.is_finite() && threshold > 0.0 && threshold < 1.0) {
            return Err(AggregationError::InvalidThreshold(format!(
                "{threshold} is not in (0, 1)"
            )));
        }
        Ok(Self {
            threshold,
            ..Default::default()
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Aggregates `runs` into exactly one snapshot.
    ///
    /// # Errors
    ///
    /// `EmptyInput` for an empty slice and `NoSuccessfulRuns` when every
    /// run failed. A treated run without a baseline is not an error; it is
    /// recorded in `exclusions`.
    pub fn aggregate(&self, runs: &[BenchmarkRun]) -> Result<BenchmarkSnapshot, AggregationError> {
        if runs.is_empty() {
            return Err(AggregationError::EmptyInput);
        }

        let mut failed_runs = 0usize;
        let mut repositories = BTreeSet::new();
        // repository -> baseline scores
        let mut baselines: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        // (treatment, repository, run_id, score) in input order
        let mut treated = Vec::new();

        for run in runs {
            let Some(result) = run.result() else {
                failed_runs += 1;
                continue;
            };
            repositories.insert(run.repository_ref());
            match run.treatment_id() {
                None => baselines
                    .entry(run.repository_ref())
                    .or_default()
                    .push(result.score()),
                Some(treatment) => {
                    treated.push((treatment, run.repository_ref(), run.run_id(), result.score()))
                }
            }
        }

        if repositories.is_empty() {
            return Err(AggregationError::NoSuccessfulRuns(runs.len()));
        }

        let baseline_scores: BTreeMap<&str, f64> = baselines
            .iter()
            .map(|(repo, scores)| (*repo, super::stats::mean(scores)))
            .collect();

        let mut deltas: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        let mut excluded: BTreeMap<&str, usize> = BTreeMap::new();
        let mut exclusions = Vec::new();

        for (treatment, repository, run_id, score) in treated {
            match baseline_scores.get(repository) {
                Some(baseline) => deltas.entry(treatment).or_default().push(score - baseline),
                None => {
                    warn!(
                        repository = repository,
                        treatment = treatment,
                        run_id = %run_id,
                        "Excluding treated run: no baseline for repository"
                    );
                    *excluded.entry(treatment).or_default() += 1;
                    exclusions.push(Exclusion {
                        run_id,
                        repository_ref: repository.to_string(),
                        treatment_id: treatment.to_string(),
                        reason: ExclusionReason::MissingBaseline,
                    });
                }
            }
        }
        exclusions.sort_by(|a, b| {
            (&a.treatment_id, &a.repository_ref, a.run_id)
                .cmp(&(&b.treatment_id, &b.repository_ref, b.run_id))
        });

        for (treatment, count) in &excluded {
            if !deltas.contains_key(treatment) {
                warn!(
                    treatment = *treatment,
                    excluded = *count,
                    "Treatment has no runs with a matching baseline; omitted from rankings"
                );
            }
        }

        let mut rankings: Vec<AggregatedStatistic> = deltas
            .iter()
            .filter_map(|(treatment, values)| {
                let summary = Summary::of(values)?;
                Some(AggregatedStatistic {
                    treatment_id: treatment.to_string(),
                    mean_delta: summary.mean,
                    median_delta: summary.median,
                    std_delta: summary.std_dev,
                    sample_size: summary.count,
                    significant: is_significant(summary.mean, self.threshold),
                    excluded_runs: excluded.get(treatment).copied().unwrap_or(0),
                })
            })
            .collect();
        rankings.sort_by(|a, b| {
            b.mean_delta
                .total_cmp(&a.mean_delta)
                .then_with(|| a.treatment_id.cmp(&b.treatment_id))
        });

        let snapshot = BenchmarkSnapshot {
            snapshot_id: Uuid::new_v4(),
            created_at: Utc::now(),
            repository_count: repositories.len(),
            rankings,
            exclusions,
            failed_runs,
            significance_method: SIGNIFICANCE_METHOD.to_string(),
            significance_threshold: self.threshold,
        };

        self.metrics.record_snapshot(
            snapshot
                .rankings
                .iter()
                .map(|s| (s.treatment_id.as_str(), s.mean_delta)),
        );
        self.metrics
            .record_excluded("missing_baseline", snapshot.exclusions.len());
        self.metrics.record_excluded("failed", failed_runs);

        info!(
            snapshot_id = %snapshot.snapshot_id,
            repositories = snapshot.repository_count,
            treatments = snapshot.rankings.len(),
            excluded = snapshot.exclusions.len(),
            failed_runs = failed_runs,
            "Benchmark snapshot created"
        );

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::result::{ExecutionResult, ScoreSummary};
    use crate::scheduler::FailureKind;

    fn run(repo: &str, treatment: Option<&str>, score: f64) -> BenchmarkRun {
        let result = ExecutionResult::synthetic(ScoreSummary::from_accuracy(score, 1, 1)).unwrap();
        BenchmarkRun::completed(
            repo,
            treatment.map(str::to_string),
            result,
            Utc::now(),
            Duration::from_secs(1),
        )
    }

    fn failed(repo: &str, treatment: Option<&str>) -> BenchmarkRun {
        BenchmarkRun::failed(
            repo,
            treatment.map(str::to_string),
            FailureKind::NonZeroExit,
            "exit 1",
            Utc::now(),
            Duration::ZERO,
        )
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_reference_deltas() {
        let runs = vec![
            run("r1", None, 0.50),
            run("r1", Some("lint"), 0.60),
            run("r2", None, 0.40),
            run("r2", Some("lint"), 0.52),
            run("r3", None, 0.30),
            run("r3", Some("lint"), 0.45),
        ];

        let snapshot = Aggregator::default().aggregate(&runs).unwrap();
        let stat = snapshot.statistic("lint").unwrap();
        assert!((stat.mean_delta - 0.123_333_333).abs() < 1e-6);
        assert!((stat.median_delta - 0.12).abs() < 1e-9);
        assert!((stat.std_delta - 0.025_166_114_8).abs() < 1e-6);
        assert_eq!(stat.sample_size, 3);
        assert!(stat.significant);
        assert_eq!(snapshot.repository_count, 3);
        assert_eq!(snapshot.significance_method, "threshold_heuristic");
    }

    #[test]
    fn test_significance_boundary() {
        assert!(!is_significant(0.05, 0.05));
        assert!(!is_significant(-0.05, 0.05));
        assert!(is_significant(0.050_000_1, 0.05));
        assert!(is_significant(-0.050_000_1, 0.05));
        assert!(!is_significant(0.049_999_9, 0.05));
        assert!(!is_significant(0.0, 0.05));
    }

    #[test]
    fn test_negative_effect_is_significant() {
        let runs = vec![
            run("r1", None, 0.80),
            run("r1", Some("strip-docs"), 0.60),
        ];
        let snapshot = Aggregator::default().aggregate(&runs).unwrap();
        let stat = snapshot.statistic("strip-docs").unwrap();
        assert!(approx(stat.mean_delta, -0.2));
        assert!(stat.significant);
        assert_eq!(stat.std_delta, 0.0);
    }

    #[test]
    fn test_missing_baseline_is_soft_exclusion() {
        let runs = vec![
            run("r1", None, 0.50),
            run("r1", Some("lint"), 0.60),
            run("r2", Some("lint"), 0.90),
            run("r3", Some("orphan"), 0.70),
        ];

        let snapshot = Aggregator::default().aggregate(&runs).unwrap();
        let lint = snapshot.statistic("lint").unwrap();
        assert_eq!(lint.sample_size, 1);
        assert_eq!(lint.excluded_runs, 1);
        assert!(approx(lint.mean_delta, 0.1));

        // every treated run lacked a baseline, so no statistic at all
        assert!(snapshot.statistic("orphan").is_none());
        assert_eq!(snapshot.excluded_count(), 2);
        assert!(snapshot
            .exclusions
            .iter()
            .all(|e| e.reason == ExclusionReason::MissingBaseline));
    }

    #[test]
    fn test_failed_runs_are_ignored_and_counted() {
        let runs = vec![
            run("r1", None, 0.50),
            run("r1", Some("lint"), 0.70),
            failed("r2", None),
            failed("r2", Some("lint")),
        ];

        let snapshot = Aggregator::default().aggregate(&runs).unwrap();
        assert_eq!(snapshot.failed_runs, 2);
        assert_eq!(snapshot.repository_count, 1);
        assert_eq!(snapshot.statistic("lint").unwrap().sample_size, 1);
        assert!(snapshot.exclusions.is_empty());
    }

    #[test]
    fn test_multiple_baselines_are_averaged() {
        let runs = vec![
            run("r1", None, 0.40),
            run("r1", None, 0.60),
            run("r1", Some("lint"), 0.70),
        ];
        let snapshot = Aggregator::default().aggregate(&runs).unwrap();
        assert!(approx(snapshot.statistic("lint").unwrap().mean_delta, 0.2));
    }

    #[test]
    fn test_ranking_is_deterministic_with_tie_break() {
        let runs = vec![
            run("r1", None, 0.50),
            run("r1", Some("zeta"), 0.60),
            run("r1", Some("alpha"), 0.60),
            run("r1", Some("best"), 0.90),
            run("r1", Some("worse"), 0.40),
        ];
        let aggregator = Aggregator::default();

        let first = aggregator.aggregate(&runs).unwrap();
        let mut reversed = runs.clone();
        reversed.reverse();
        let second = aggregator.aggregate(&reversed).unwrap();

        let order = |s: &BenchmarkSnapshot| -> Vec<String> {
            s.rankings.iter().map(|r| r.treatment_id.clone()).collect()
        };
        assert_eq!(order(&first), vec!["best", "alpha", "zeta", "worse"]);
        assert_eq!(order(&first), order(&second));
        assert_ne!(first.snapshot_id, second.snapshot_id);
    }

    #[test]
    fn test_input_errors() {
        let aggregator = Aggregator::default();
        assert_eq!(aggregator.aggregate(&[]), Err(AggregationError::EmptyInput));
        assert_eq!(
            aggregator.aggregate(&[failed("r1", None), failed("r1", Some("lint"))]),
            Err(AggregationError::NoSuccessfulRuns(2))
        );
    }

    #[test]
    fn test_threshold_validation() {
        assert!(Aggregator::new(0.05).is_ok());
        for bad in [0.0, 1.0, -0.1, f64::NAN] {
            assert!(matches!(
                Aggregator::new(bad),
                Err(AggregationError::InvalidThreshold(_))
            ));
        }
    }

    #[test]
    fn test_custom_threshold_changes_flag() {
        let runs = vec![run("r1", None, 0.50), run("r1", Some("lint"), 0.58)];
        let loose = Aggregator::default().aggregate(&runs).unwrap();
        let strict = Aggregator::new(0.1).unwrap().aggregate(&runs).unwrap();
        assert!(loose.statistic("lint").unwrap().significant);
        assert!(!strict.statistic("lint").unwrap().significant);
        assert!(approx(strict.significance_threshold, 0.1));
    }

    #[test]
    fn test_input_runs_not_mutated() {
        let runs = vec![run("r1", None, 0.5), run("r1", Some("lint"), 0.6)];
        let before = runs.clone();
        let _ = Aggregator::default().aggregate(&runs).unwrap();
        assert_eq!(runs, before);
    }
}
