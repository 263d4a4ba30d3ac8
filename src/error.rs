//! Error types for treatment-bench operations.
//!
//! Defines error types for each stage of a benchmark batch:
//! - Job configuration validation
//! - Result file decoding
//! - Per-job execution inside the scheduler
//! - Scheduler configuration
//! - Cross-repository aggregation
//! - Snapshot persistence
//! - Process-wide settings

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while building a `JobConfig`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid {field} '{value}': allowed values are [{allowed}]")]
    NotAllowed {
        field: &'static str,
        value: String,
        allowed: String,
    },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Credential must not be empty")]
    EmptyCredential,

    #[error("{field} must be greater than 0")]
    NonPositive { field: &'static str },

    #[error("output_dir '{0}' is not a valid absolute path")]
    InvalidOutputDir(String),
}

/// Errors raised while decoding the executor's results file.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Results path '{path}' escapes output directory '{root}'")]
    PathEscape { path: PathBuf, root: PathBuf },

    #[error("Results file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read results file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Results path '{0}' is not a regular file")]
    NotAFile(PathBuf),

    #[error("Results file '{path}' exceeds {limit} bytes")]
    TooLarge { path: PathBuf, limit: u64 },

    #[error("Malformed results file '{path}': {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Results file '{path}' is missing required field '{field}'")]
    MissingField { path: PathBuf, field: &'static str },

    #[error("Results file '{path}' has invalid field '{field}': {reason}")]
    InvalidField {
        path: PathBuf,
        field: &'static str,
        reason: String,
    },
}

/// A score field outside its allowed range.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{field} must be a finite value in [0, 1], got {value}")]
pub struct InvalidScore {
    pub field: &'static str,
    pub value: f64,
}

/// Errors that terminate a single job inside a batch.
///
/// These never abort the batch; the scheduler records them next to the
/// successful runs.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Executor failed to launch: {0}")]
    LaunchFailed(String),

    #[error("Executor exited with code {code}: {stderr_tail}")]
    NonZeroExit { code: i32, stderr_tail: String },

    #[error("Executor timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Score provider returned an invalid score: {0}")]
    InvalidScore(#[from] InvalidScore),

    #[error("Job did not report completion within {0:?}")]
    Unresponsive(Duration),

    #[error("Job worker panicked: {0}")]
    Panicked(String),
}

/// Errors raised when configuring the bounded scheduler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("max_workers must be greater than 0, got {0}")]
    InvalidWorkerCount(usize),
}

/// Errors raised by the aggregator for caller-side contract violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregationError {
    #[error("No runs to aggregate")]
    EmptyInput,

    #[error("None of the {0} runs completed successfully")]
    NoSuccessfulRuns(usize),

    #[error("Invalid significance threshold: {0}")]
    InvalidThreshold(String),
}

/// Errors raised by snapshot stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Snapshot '{0}' already exists")]
    Duplicate(uuid::Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt snapshot record '{id}': {reason}")]
    Corrupt { id: String, reason: String },
}

/// Errors raised while loading process-wide settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Settings validation failed: {0}")]
    ValidationFailed(String),
}
