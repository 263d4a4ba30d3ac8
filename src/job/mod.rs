//! Job configuration: allowlisted identifiers and the validating builder.
//!
//! A `JobConfig` is the only way to describe an executor invocation. It is
//! built once from `RawJobInputs`, rejects anything outside the model and
//! agent allowlists, and is immutable afterwards.
//!
//! # Example
//!
//! ```ignore
//! use treatment_bench::job::{JobConfig, RawJobInputs};
//!
//! let config = JobConfig::build(
//!     RawJobInputs::new()
//!         .with_model("anthropic/claude-haiku-4-5")
//!         .with_agent("claude-code")
//!         .with_output_dir("/var/bench/repo-a/baseline")
//!         .with_credential(api_key),
//! )?;
//! ```

pub mod allowlist;
pub mod config;

pub use allowlist::{AgentId, ModelId};
pub use config::{
    Credential, JobConfig, RawJobInputs, DEFAULT_CONCURRENCY_HINT, DEFAULT_TIMEOUT,
};
