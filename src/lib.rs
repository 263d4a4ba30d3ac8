//! treatment-bench: measure how repository treatments change agent
//! benchmark scores.
//!
//! Each repository is benchmarked once untreated (the baseline) and once per
//! treatment. Jobs run through a bounded scheduler that isolates failures,
//! and the successful runs are aggregated into a ranked snapshot of mean
//! score deltas per treatment.

// Core modules
pub mod aggregate;
pub mod cli;
pub mod error;
pub mod job;
pub mod metrics;
pub mod result;
pub mod runner;
pub mod scheduler;
pub mod settings;
pub mod storage;

// Re-export commonly used types
pub use aggregate::{AggregatedStatistic, Aggregator, BenchmarkSnapshot};
pub use error::{
    AggregationError, DecodeError, JobError, PoolError, SettingsError, StoreError,
    ValidationError,
};
pub use job::{JobConfig, RawJobInputs};
pub use result::ExecutionResult;
pub use scheduler::{BatchOutcome, BenchmarkJob, BenchmarkRun, WorkerPool, WorkerPoolConfig};
pub use settings::BenchSettings;
pub use storage::SnapshotStore;
