//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by treatment-bench and
//! provides functions for initializing, registering, and exporting them.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all treatment-bench metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total number of benchmark jobs finished, labeled by outcome.
pub static JOBS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Benchmark job duration in seconds, labeled by outcome.
pub static JOB_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of executor invocations currently in flight.
pub static JOBS_IN_FLIGHT: OnceLock<Gauge> = OnceLock::new();

/// Total snapshots produced by the aggregator.
pub static SNAPSHOTS_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Runs left out of aggregation, labeled by reason.
pub static RUNS_EXCLUDED: OnceLock<CounterVec> = OnceLock::new();

/// Latest mean delta per treatment.
pub static TREATMENT_MEAN_DELTA: OnceLock<GaugeVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Until then every recording method on
/// `MetricsCollector` is a no-op.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // Job metrics
    let jobs_total = CounterVec::new(
        Opts::new("treatment_bench_jobs_total", "Total benchmark jobs finished"),
        &["outcome"],
    )?;

    let job_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "treatment_bench_job_duration_seconds",
            "Benchmark job duration in seconds",
        )
        .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        &["outcome"],
    )?;

    let jobs_in_flight = Gauge::new(
        "treatment_bench_jobs_in_flight",
        "Executor invocations currently in flight",
    )?;

    // Aggregation metrics
    let snapshots_total = Counter::new(
        "treatment_bench_snapshots_total",
        "Total benchmark snapshots created",
    )?;

    let runs_excluded = CounterVec::new(
        Opts::new(
            "treatment_bench_runs_excluded_total",
            "Runs left out of aggregation",
        ),
        &["reason"],
    )?;

    let treatment_mean_delta = GaugeVec::new(
        Opts::new(
            "treatment_bench_treatment_mean_delta",
            "Latest mean score delta per treatment",
        ),
        &["treatment"],
    )?;

    registry.register(Box::new(jobs_total.clone()))?;
    registry.register(Box::new(job_duration.clone()))?;
    registry.register(Box::new(jobs_in_flight.clone()))?;
    registry.register(Box::new(snapshots_total.clone()))?;
    registry.register(Box::new(runs_excluded.clone()))?;
    registry.register(Box::new(treatment_mean_delta.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = JOBS_TOTAL.set(jobs_total);
    let _ = JOB_DURATION.set(job_duration);
    let _ = JOBS_IN_FLIGHT.set(jobs_in_flight);
    let _ = SNAPSHOTS_TOTAL.set(snapshots_total);
    let _ = RUNS_EXCLUDED.set(runs_excluded);
    let _ = TREATMENT_MEAN_DELTA.set(treatment_mean_delta);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line if the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
