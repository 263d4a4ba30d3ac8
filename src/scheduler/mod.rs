//! Bounded job scheduler: runs a batch of benchmark jobs concurrently with
//! per-job failure isolation.
//!
//! - **BenchmarkExecutor**: the seam producing scores for one job, backed
//!   by the real executor (`HarnessExecutor`) or a stand-in
//!   (`SyntheticExecutor`)
//! - **WorkerPool**: semaphore-bounded pool running the batch
//! - **BatchOutcome**: every success and every failure, never discarded
//!
//! # Architecture
//!
//! ```text
//!     Vec<BenchmarkJob>
//!            │
//!     ┌──────▼───────┐
//!     │  WorkerPool  │  Semaphore(max_workers)
//!     └──────┬───────┘
//!            │  timeout(job timeout + grace)
//!    ┌───────┼────────────────┐
//!    ▼       ▼                ▼
//! ┌──────┐ ┌──────┐       ┌──────┐
//! │ job 1│ │ job 2│  ...  │ job N│ ── BenchmarkExecutor::execute
//! └──┬───┘ └──┬───┘       └──┬───┘
//!    └────────┴──────┬───────┘
//!                    ▼
//!       BatchOutcome { successes, failures, stats }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use treatment_bench::runner::ExecutorInvocation;
//! use treatment_bench::scheduler::{HarnessExecutor, WorkerPool, WorkerPoolConfig};
//!
//! let executor = Arc::new(HarnessExecutor::new(ExecutorInvocation::default()));
//! let pool = WorkerPool::new(WorkerPoolConfig::new(4), executor)?;
//! let outcome = pool.run_all(jobs).await;
//! println!("{} ok, {} failed", outcome.successes.len(), outcome.failures.len());
//! ```

pub mod executor;
pub mod run;
pub mod synthetic;
pub mod worker_pool;

pub use executor::{BenchmarkExecutor, HarnessExecutor};
pub use run::{
    BatchOutcome, BatchVerdict, BenchmarkJob, BenchmarkRun, FailureKind, JobFailure, RunOutcome,
};
pub use synthetic::{HashedScores, ScoreProvider, ScoreTable, SyntheticExecutor};
pub use worker_pool::{
    PoolStats, WorkerPool, WorkerPoolConfig, DEFAULT_MAX_WORKERS, DEFAULT_STUCK_GRACE,
};
