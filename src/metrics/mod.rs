//! Metrics module for Prometheus-based monitoring.
//!
//! Covers scheduler activity (jobs by outcome, durations, in-flight
//! invocations) and aggregation (snapshots, excluded runs, per-treatment
//! mean deltas).
//!
//! # Example
//!
//! ```ignore
//! use treatment_bench::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! MetricsCollector::new().record_job("success", Duration::from_secs(42));
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    JOBS_IN_FLIGHT, JOBS_TOTAL, JOB_DURATION, REGISTRY, RUNS_EXCLUDED, SNAPSHOTS_TOTAL,
    TREATMENT_MEAN_DELTA,
};
