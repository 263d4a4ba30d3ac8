//! Argument contract for the external benchmark executor.

use serde::{Deserialize, Serialize};

use crate::job::JobConfig;

/// Default executor binary.
pub const DEFAULT_EXECUTOR: &str = "harbor";

/// Default benchmark suite.
pub const DEFAULT_DATASET: &str = "terminal-bench@2.0";

/// Executable plus the suite it runs, from which each job's argument list
/// is derived.
///
/// The produced shape is fixed:
///
/// ```text
/// run --dataset <dataset> --agent <agent> --model <model>
///     --jobs-dir <output_dir> --n-concurrent <hint>
/// ```
///
/// Only allowlisted identifiers and the validated output directory ever
/// reach the argument list; the credential travels through the
/// environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorInvocation {
    pub program: String,
    pub dataset: String,
}

impl ExecutorInvocation {
    /// Creates an invocation for the given executable and suite.
    pub fn new(program: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            dataset: dataset.into(),
        }
    }

    /// Builds the ordered argument list for one job.
    pub fn args(&self, config: &JobConfig) -> Vec<String> {
        vec![
            "run".to_string(),
            "--dataset".to_string(),
            self.dataset.clone(),
            "--agent".to_string(),
            config.agent_id().to_string(),
            "--model".to_string(),
            config.model_id().to_string(),
            "--jobs-dir".to_string(),
            config.output_dir().display().to_string(),
            "--n-concurrent".to_string(),
            config.concurrency_hint().to_string(),
        ]
    }
}

impl Default for ExecutorInvocation {
    fn default() -> Self {
        Self::new(DEFAULT_EXECUTOR, DEFAULT_DATASET)
    }
}
