//! Bounded worker pool that runs a batch of benchmark jobs.
//!
//! Each job runs as an independent async task. A counting semaphore caps
//! the number of executor invocations in flight; every task reports back
//! exactly once, either with a `BenchmarkRun` or a `JobFailure`.
//!
//! # Features
//!
//! - Configurable number of workers (default 4)
//! - Per-job timeout from the job's own `JobConfig`
//! - Stuck-worker guard: timeout plus a bounded grace period
//! - Panic isolation: a panicking job is reported, siblings continue
//! - Pool statistics tracking, including peak concurrency

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use super::executor::BenchmarkExecutor;
use super::run::{BatchOutcome, BenchmarkJob, BenchmarkRun, FailureKind, JobFailure};
use crate::error::{JobError, PoolError};
use crate::metrics::MetricsCollector;
use crate::result::ExecutionResult;

/// Default number of concurrent executor invocations.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default time a job may overrun its own timeout before it is force-failed.
pub const DEFAULT_STUCK_GRACE: Duration = Duration::from_secs(30);

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum number of jobs in flight at once.
    pub max_workers: usize,
    /// Extra time beyond a job's timeout before the job is declared
    /// unresponsive.
    pub stuck_grace: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            stuck_grace: DEFAULT_STUCK_GRACE,
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers,
            ..Default::default()
        }
    }

    /// Sets the stuck-worker grace period.
    pub fn with_stuck_grace(mut self, grace: Duration) -> Self {
        self.stuck_grace = grace;
        self
    }
}

/// Statistics about one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    /// Worker limit the batch ran with.
    pub max_workers: usize,
    /// Total number of jobs completed successfully.
    pub jobs_completed: u64,
    /// Total number of jobs that failed.
    pub jobs_failed: u64,
    /// Highest number of jobs observed in flight at once.
    pub peak_in_flight: usize,
    /// Average job processing duration.
    pub average_job_duration: Duration,
}

impl PoolStats {
    /// Returns the total number of jobs processed (completed + failed).
    pub fn total_processed(&self) -> u64 {
        self.jobs_completed + self.jobs_failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.jobs_completed as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    total_duration_ms: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            peak_in_flight: AtomicU64::new(0),
        }
    }

    fn record_completion(&self, duration: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Marks a job as in flight until the returned guard is dropped.
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        MetricsCollector::new().inc_jobs_in_flight();
        InFlightGuard {
            stats: Arc::clone(self),
        }
    }

    fn to_pool_stats(&self, max_workers: usize) -> PoolStats {
        let completed = self.jobs_completed.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);

        let total_jobs = completed + failed;
        let average_duration = if total_jobs > 0 {
            Duration::from_millis(total_duration_ms / total_jobs)
        } else {
            Duration::ZERO
        };

        PoolStats {
            max_workers,
            jobs_completed: completed,
            jobs_failed: failed,
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst) as usize,
            average_job_duration: average_duration,
        }
    }
}

/// Decrements the in-flight count on drop, including during a panic unwind.
struct InFlightGuard {
    stats: Arc<SharedPoolStats>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        MetricsCollector::new().dec_jobs_in_flight();
    }
}

/// What a worker task hands back.
struct Completion {
    started_at: DateTime<Utc>,
    duration: Duration,
    result: Result<ExecutionResult, JobError>,
}

/// Identity of a dispatched job, kept by the dispatcher so a panicked
/// task can still be attributed.
struct Dispatched {
    repository_ref: String,
    treatment_id: Option<String>,
    dispatched_at: DateTime<Utc>,
    start: Instant,
}

/// Runs batches of jobs with at most `max_workers` in flight.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    executor: Arc<dyn BenchmarkExecutor>,
    metrics: MetricsCollector,
}

impl WorkerPool {
    /// Creates a new worker pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidWorkerCount` when `max_workers` is zero.
    pub fn new(
        config: WorkerPoolConfig,
        executor: Arc<dyn BenchmarkExecutor>,
    ) -> Result<Self, PoolError> {
        if config.max_workers == 0 {
            return Err(PoolError::InvalidWorkerCount(config.max_workers));
        }
        Ok(Self {
            config,
            executor,
            metrics: MetricsCollector::new(),
        })
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Runs every job and returns all successes and all failures.
    ///
    /// A failing, hanging or panicking job never affects its siblings, and
    /// every input job appears exactly once in the outcome.
    pub async fn run_all(&self, jobs: Vec<BenchmarkJob>) -> BatchOutcome {
        let total = jobs.len();
        info!(
            jobs = total,
            max_workers = self.config.max_workers,
            executor = self.executor.name(),
            "Starting benchmark batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let stats = Arc::new(SharedPoolStats::new());
        let mut tasks = JoinSet::new();
        let mut dispatched = HashMap::with_capacity(total);

        for job in jobs {
            let meta = Dispatched {
                repository_ref: job.repository_ref.clone(),
                treatment_id: job.treatment_id.clone(),
                dispatched_at: Utc::now(),
                start: Instant::now(),
            };
            let handle = tasks.spawn(run_job(
                job,
                Arc::clone(&self.executor),
                Arc::clone(&semaphore),
                Arc::clone(&stats),
                self.config.stuck_grace,
            ));
            dispatched.insert(handle.id(), meta);
        }

        let mut successes = Vec::with_capacity(total);
        let mut failures = Vec::new();

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, joined) = match joined {
                Ok((id, completion)) => (id, Ok(completion)),
                Err(join_error) => (join_error.id(), Err(join_error)),
            };
            let Some(meta) = dispatched.remove(&id) else {
                error!(task_id = %id, "Finished task has no dispatch record");
                continue;
            };

            let completion = match joined {
                Ok(completion) => completion,
                Err(join_error) => {
                    error!(
                        repository = %meta.repository_ref,
                        error = %join_error,
                        "Benchmark job task did not complete"
                    );
                    Completion {
                        started_at: meta.dispatched_at,
                        duration: meta.start.elapsed(),
                        result: Err(JobError::Panicked(join_failure_reason(join_error))),
                    }
                }
            };

            self.record(meta, completion, &stats, &mut successes, &mut failures);
        }

        let stats = stats.to_pool_stats(self.config.max_workers);
        info!(
            succeeded = successes.len(),
            failed = failures.len(),
            peak_in_flight = stats.peak_in_flight,
            avg_duration_ms = stats.average_job_duration.as_millis() as u64,
            "Benchmark batch finished"
        );

        BatchOutcome {
            successes,
            failures,
            stats,
        }
    }

    fn record(
        &self,
        meta: Dispatched,
        completion: Completion,
        stats: &SharedPoolStats,
        successes: &mut Vec<BenchmarkRun>,
        failures: &mut Vec<JobFailure>,
    ) {
        let treatment = meta.treatment_id.as_deref().unwrap_or("baseline");
        match completion.result {
            Ok(result) => {
                stats.record_completion(completion.duration);
                self.metrics.record_job("success", completion.duration);
                let run = BenchmarkRun::completed(
                    meta.repository_ref,
                    meta.treatment_id,
                    result,
                    completion.started_at,
                    completion.duration,
                );
                info!(
                    repository = run.repository_ref(),
                    treatment = run.treatment_id().unwrap_or("baseline"),
                    run_id = %run.run_id(),
                    duration_ms = completion.duration.as_millis() as u64,
                    "Benchmark job completed"
                );
                successes.push(run);
            }
            Err(error) => {
                let kind = FailureKind::from(&error);
                let reason = error.to_string();
                stats.record_failure(completion.duration);
                self.metrics.record_job(kind.as_str(), completion.duration);
                warn!(
                    repository = %meta.repository_ref,
                    treatment = treatment,
                    kind = kind.as_str(),
                    error = %reason,
                    "Benchmark job failed"
                );
                let run = BenchmarkRun::failed(
                    meta.repository_ref,
                    meta.treatment_id,
                    kind,
                    reason.clone(),
                    completion.started_at,
                    completion.duration,
                );
                failures.push(JobFailure { kind, reason, run });
            }
        }
    }
}

fn join_failure_reason(join_error: JoinError) -> String {
    if !join_error.is_panic() {
        return format!("job worker aborted: {join_error}");
    }
    let payload = join_error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "job worker panicked".to_string()
    }
}

/// Body of one worker task.
async fn run_job(
    job: BenchmarkJob,
    executor: Arc<dyn BenchmarkExecutor>,
    semaphore: Arc<Semaphore>,
    stats: Arc<SharedPoolStats>,
    stuck_grace: Duration,
) -> Completion {
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            return Completion {
                started_at: Utc::now(),
                duration: Duration::ZERO,
                result: Err(JobError::LaunchFailed(format!(
                    "worker pool closed before dispatch: {e}"
                ))),
            }
        }
    };
    let _in_flight = stats.enter();

    let started_at = Utc::now();
    let start = Instant::now();
    let limit = job.config.timeout().saturating_add(stuck_grace);

    info!(
        repository = %job.repository_ref,
        treatment = job.treatment_label(),
        "Dispatching benchmark job"
    );

    let result = match tokio::time::timeout(limit, executor.execute(&job)).await {
        Ok(result) => result,
        Err(_) => Err(JobError::Unresponsive(limit)),
    };

    Completion {
        started_at,
        duration: start.elapsed(),
        result,
    }
}
