//! The seam between the scheduler and whatever produces scores.

use async_trait::async_trait;
use tracing::debug;

use super::run::BenchmarkJob;
use crate::error::JobError;
use crate::result::{ExecutionResult, ResultDecoder};
use crate::runner::{ExecutorInvocation, ProcessRunner};

/// Produces an `ExecutionResult` for one job.
///
/// The scheduler treats every implementation identically; only
/// `ExecutionResult::is_synthetic` tells them apart.
#[async_trait]
pub trait BenchmarkExecutor: Send + Sync {
    /// Runs one job to completion or failure.
    async fn execute(&self, job: &BenchmarkJob) -> Result<ExecutionResult, JobError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Runs the real executor binary, then decodes its results file.
#[derive(Debug, Clone)]
pub struct HarnessExecutor {
    invocation: ExecutorInvocation,
    runner: ProcessRunner,
    decoder: ResultDecoder,
}

impl HarnessExecutor {
    pub fn new(invocation: ExecutorInvocation) -> Self {
        let runner = ProcessRunner::new(&invocation.program);
        Self {
            invocation,
            runner,
            decoder: ResultDecoder::new(),
        }
    }

    /// Replaces the process runner, e.g. to inject the `PATH`/`HOME` source.
    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_decoder(mut self, decoder: ResultDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn invocation(&self) -> &ExecutorInvocation {
        &self.invocation
    }
}

#[async_trait]
impl BenchmarkExecutor for HarnessExecutor {
    async fn execute(&self, job: &BenchmarkJob) -> Result<ExecutionResult, JobError> {
        let args = self.invocation.args(&job.config);
        let report = self.runner.run(&job.config, &args).await;
        report.outcome.into_result()?;

        debug!(
            repository = %job.repository_ref,
            treatment = job.treatment_label(),
            "Executor finished, decoding results"
        );
        Ok(self.decoder.decode_async(&job.config).await?)
    }

    fn name(&self) -> &str {
        &self.invocation.program
    }
}
