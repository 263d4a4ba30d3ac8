//! High-level recording interface over the raw Prometheus metrics.

use std::time::Duration;

use super::prometheus::{
    JOBS_IN_FLIGHT, JOBS_TOTAL, JOB_DURATION, RUNS_EXCLUDED, SNAPSHOTS_TOTAL,
    TREATMENT_MEAN_DELTA,
};

/// Metrics collector for scheduler and aggregator events.
///
/// Zero-sized; every method silently does nothing until
/// [`init_metrics`](super::init_metrics) has run.
///
/// # Example
///
/// ```ignore
/// use treatment_bench::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics()?;
/// let collector = MetricsCollector::new();
/// collector.record_job("success", Duration::from_secs(95));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a finished job.
    ///
    /// `outcome` is `"success"` or a failure kind label such as
    /// `"timed_out"`.
    pub fn record_job(&self, outcome: &str, duration: Duration) {
        if let Some(jobs_total) = JOBS_TOTAL.get() {
            jobs_total.with_label_values(&[outcome]).inc();
        }

        if let Some(job_duration) = JOB_DURATION.get() {
            job_duration
                .with_label_values(&[outcome])
                .observe(duration.as_secs_f64());
        }

        tracing::trace!(
            outcome = outcome,
            duration_ms = duration.as_millis() as u64,
            "Recorded job metric"
        );
    }

    pub fn inc_jobs_in_flight(&self) {
        if let Some(in_flight) = JOBS_IN_FLIGHT.get() {
            in_flight.inc();
        }
    }

    pub fn dec_jobs_in_flight(&self) {
        if let Some(in_flight) = JOBS_IN_FLIGHT.get() {
            in_flight.dec();
        }
    }

    /// Record a snapshot and the mean delta of each ranked treatment.
    pub fn record_snapshot<'a>(&self, mean_deltas: impl IntoIterator<Item = (&'a str, f64)>) {
        if let Some(snapshots) = SNAPSHOTS_TOTAL.get() {
            snapshots.inc();
        }

        if let Some(gauge) = TREATMENT_MEAN_DELTA.get() {
            for (treatment, mean_delta) in mean_deltas {
                gauge.with_label_values(&[treatment]).set(mean_delta);
            }
        }
    }

    /// Record runs left out of aggregation.
    ///
    /// `reason` is `"missing_baseline"` or `"failed"`.
    pub fn record_excluded(&self, reason: &str, count: usize) {
        if count == 0 {
            return;
        }
        if let Some(excluded) = RUNS_EXCLUDED.get() {
            excluded.with_label_values(&[reason]).inc_by(count as f64);
        }

        tracing::trace!(reason = reason, count = count, "Recorded exclusion metric");
    }
}
