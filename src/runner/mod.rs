//! Secure process runner for the external benchmark executor.
//!
//! # Architecture
//!
//! ```text
//! JobConfig ─► ExecutorInvocation::args ─┐
//!          └─► ChildEnvironment ─────────┴─► ProcessRunner::run ─► ProcessOutcome
//! ```
//!
//! The runner:
//! 1. Builds the child environment from an explicit allowlist of names
//! 2. Creates the output directory and redirects stdout/stderr into it
//! 3. Spawns the executor and waits up to the job's timeout
//! 4. Kills and reaps the child on expiry
//!
//! Outcomes are classified as success, non-zero exit, timeout or launch
//! failure and are always returned to the caller, never swallowed.

pub mod environment;
pub mod invocation;
pub mod process;

pub use environment::{ChildEnvironment, ALLOWED_VARS, CREDENTIAL_VAR, HOME_VAR, PATH_VAR};
pub use invocation::{ExecutorInvocation, DEFAULT_DATASET, DEFAULT_EXECUTOR};
pub use process::{ProcessOutcome, ProcessReport, ProcessRunner, STDERR_LOG, STDOUT_LOG};
