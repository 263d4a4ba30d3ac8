//! Process-wide settings for treatment-bench.
//!
//! Defaults cover a local run against the standard executor; each field can
//! be overridden through a `BENCH_*` environment variable.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::aggregate::DEFAULT_SIGNIFICANCE_THRESHOLD;
use crate::error::SettingsError;
use crate::runner::{ExecutorInvocation, CREDENTIAL_VAR, DEFAULT_DATASET, DEFAULT_EXECUTOR};
use crate::scheduler::{WorkerPoolConfig, DEFAULT_MAX_WORKERS, DEFAULT_STUCK_GRACE};

/// Default SQLite snapshot history location.
pub const DEFAULT_STORE_PATH: &str = "./benchmark-snapshots.db";

/// Settings shared by the CLI commands.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchSettings {
    // Executor settings
    /// Executable invoked for every job.
    pub executor: String,
    /// Benchmark suite passed to the executor.
    pub dataset: String,
    /// Host variable the credential is read from.
    pub credential_var: String,

    // Scheduler settings
    /// Maximum concurrent executor invocations.
    pub max_workers: usize,
    /// Time beyond a job's own timeout before it is declared unresponsive.
    pub stuck_grace: Duration,

    // Aggregation settings
    /// `abs(mean_delta)` above which a treatment is flagged.
    pub significance_threshold: f64,

    // Storage settings
    /// SQLite snapshot store path.
    pub store_path: PathBuf,
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            executor: DEFAULT_EXECUTOR.to_string(),
            dataset: DEFAULT_DATASET.to_string(),
            credential_var: CREDENTIAL_VAR.to_string(),
            max_workers: DEFAULT_MAX_WORKERS,
            stuck_grace: DEFAULT_STUCK_GRACE,
            significance_threshold: DEFAULT_SIGNIFICANCE_THRESHOLD,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

impl BenchSettings {
    /// Loads settings from environment variables.
    ///
    /// - `BENCH_EXECUTOR`: executor executable (default: harbor)
    /// - `BENCH_DATASET`: benchmark suite (default: terminal-bench@2.0)
    /// - `BENCH_MAX_WORKERS`: concurrent jobs (default: 4)
    /// - `BENCH_STUCK_GRACE_SECS`: grace beyond job timeout (default: 30)
    /// - `BENCH_SIGNIFICANCE_THRESHOLD`: heuristic threshold (default: 0.05)
    /// - `BENCH_STORE_PATH`: snapshot database (default: ./benchmark-snapshots.db)
    /// - `BENCH_CREDENTIAL_VAR`: credential source variable (default: ANTHROPIC_API_KEY)
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if a variable fails to parse or the result
    /// does not validate.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(val) = lookup("BENCH_EXECUTOR") {
            settings.executor = val;
        }

        if let Some(val) = lookup("BENCH_DATASET") {
            settings.dataset = val;
        }

        if let Some(val) = lookup("BENCH_CREDENTIAL_VAR") {
            settings.credential_var = val;
        }

        if let Some(val) = lookup("BENCH_MAX_WORKERS") {
            settings.max_workers = parse_env_value(&val, "BENCH_MAX_WORKERS")?;
        }

        if let Some(val) = lookup("BENCH_STUCK_GRACE_SECS") {
            let secs: u64 = parse_env_value(&val, "BENCH_STUCK_GRACE_SECS")?;
            settings.stuck_grace = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("BENCH_SIGNIFICANCE_THRESHOLD") {
            settings.significance_threshold =
                parse_env_value(&val, "BENCH_SIGNIFICANCE_THRESHOLD")?;
        }

        if let Some(val) = lookup("BENCH_STORE_PATH") {
            settings.store_path = PathBuf::from(val);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings values.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.executor.trim().is_empty() {
            return Err(SettingsError::ValidationFailed(
                "executor cannot be empty".to_string(),
            ));
        }

        if self.dataset.trim().is_empty() {
            return Err(SettingsError::ValidationFailed(
                "dataset cannot be empty".to_string(),
            ));
        }

        if self.credential_var.trim().is_empty() {
            return Err(SettingsError::ValidationFailed(
                "credential_var cannot be empty".to_string(),
            ));
        }

        if self.max_workers == 0 {
            return Err(SettingsError::ValidationFailed(
                "max_workers must be greater than 0".to_string(),
            ));
        }

        let threshold = self.significance_threshold;
        if !(threshold.is_finite() && threshold > 0.0 && threshold < 1.0) {
            return Err(SettingsError::ValidationFailed(
                "significance_threshold must be between 0.0 and 1.0 (exclusive)".to_string(),
            ));
        }

        if self.store_path.as_os_str().is_empty() {
            return Err(SettingsError::ValidationFailed(
                "store_path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set max workers.
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max;
        self
    }

    /// Builder method to set the significance threshold.
    pub fn with_significance_threshold(mut self, threshold: f64) -> Self {
        self.significance_threshold = threshold;
        self
    }

    /// Builder method to set the snapshot store path.
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    /// Executor command line derived from these settings.
    pub fn invocation(&self) -> ExecutorInvocation {
        ExecutorInvocation::new(&self.executor, &self.dataset)
    }

    /// Worker pool configuration derived from these settings.
    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new(self.max_workers).with_stuck_grace(self.stuck_grace)
    }
}

fn parse_env_value<T: FromStr>(val: &str, key: &str) -> Result<T, SettingsError>
where
    T::Err: std::fmt::Display,
{
    val.trim().parse().map_err(|e: T::Err| SettingsError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = BenchSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, BenchSettings::default());
        assert_eq!(settings.executor, "harbor");
        assert_eq!(settings.dataset, "terminal-bench@2.0");
        assert_eq!(settings.max_workers, 4);
        assert_eq!(settings.stuck_grace, Duration::from_secs(30));
        assert!((settings.significance_threshold - 0.05).abs() < f64::EPSILON);
        assert_eq!(settings.credential_var, "ANTHROPIC_API_KEY");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let settings = BenchSettings::from_lookup(lookup(&[
            ("BENCH_EXECUTOR", "/opt/harbor/bin/harbor"),
            ("BENCH_MAX_WORKERS", " 8 "),
            ("BENCH_STUCK_GRACE_SECS", "5"),
            ("BENCH_SIGNIFICANCE_THRESHOLD", "0.1"),
            ("BENCH_STORE_PATH", "/var/lib/bench/history.db"),
            ("BENCH_CREDENTIAL_VAR", "BENCH_API_KEY"),
        ]))
        .unwrap();

        assert_eq!(settings.executor, "/opt/harbor/bin/harbor");
        assert_eq!(settings.invocation().program, "/opt/harbor/bin/harbor");
        assert_eq!(settings.invocation().dataset, "terminal-bench@2.0");
        assert_eq!(settings.max_workers, 8);
        assert_eq!(settings.pool_config().stuck_grace, Duration::from_secs(5));
        assert_eq!(settings.pool_config().max_workers, 8);
        assert_eq!(settings.store_path, PathBuf::from("/var/lib/bench/history.db"));
        assert_eq!(settings.credential_var, "BENCH_API_KEY");
    }

    #[test]
    fn test_invalid_values() {
        let err = BenchSettings::from_lookup(lookup(&[("BENCH_MAX_WORKERS", "many")])).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { ref key, .. } if key == "BENCH_MAX_WORKERS"));

        let err = BenchSettings::from_lookup(lookup(&[("BENCH_MAX_WORKERS", "0")])).unwrap_err();
        assert!(matches!(err, SettingsError::ValidationFailed(_)));

        for bad in ["0", "1", "1.5", "-0.1", "NaN"] {
            let err = BenchSettings::from_lookup(lookup(&[("BENCH_SIGNIFICANCE_THRESHOLD", bad)]))
                .unwrap_err();
            assert!(matches!(err, SettingsError::ValidationFailed(_)), "{bad}");
        }
    }

    #[test]
    fn test_builders() {
        let settings = BenchSettings::default()
            .with_max_workers(2)
            .with_significance_threshold(0.2)
            .with_store_path("/tmp/h.db");
        assert_eq!(settings.max_workers, 2);
        assert!(settings.validate().is_ok());
        assert!(BenchSettings::default().with_max_workers(0).validate().is_err());
    }
}
