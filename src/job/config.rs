//! Immutable per-job configuration and its validating constructor.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use zeroize::Zeroize;

use super::allowlist::{AgentId, ModelId};
use crate::error::ValidationError;

/// Default wall-clock limit for one executor invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default executor-internal parallelism.
pub const DEFAULT_CONCURRENCY_HINT: u32 = 1;

/// Opaque secret handed to the executor through its environment.
///
/// Never printed: `Debug` shows a redaction marker and the buffer is
/// zeroed on drop.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    /// Exposes the secret for building the child environment.
    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Unvalidated inputs for a `JobConfig`.
///
/// The caller gathers these from wherever it likes (manifest, flags,
/// environment); `JobConfig::build` never reads the host environment.
#[derive(Debug, Clone, Default)]
pub struct RawJobInputs {
    pub model_id: Option<String>,
    pub agent_id: Option<String>,
    pub output_dir: Option<PathBuf>,
    /// Absolute directory a relative `output_dir` is resolved against.
    pub base_dir: Option<PathBuf>,
    pub credential: Option<String>,
    pub timeout: Option<Duration>,
    pub concurrency_hint: Option<i64>,
}

impl RawJobInputs {
    /// Creates an empty set of inputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_id = Some(model.into());
        self
    }

    /// Sets the agent identifier.
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent_id = Some(agent.into());
        self
    }

    /// Sets the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Sets the base directory for resolving a relative output directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Sets the credential.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the executor-internal concurrency hint.
    pub fn with_concurrency_hint(mut self, hint: i64) -> Self {
        self.concurrency_hint = Some(hint);
        self
    }
}

/// Validated configuration for one executor invocation.
///
/// Fields are private; once built the configuration cannot change.
#[derive(Debug, Clone)]
pub struct JobConfig {
    model_id: ModelId,
    agent_id: AgentId,
    output_dir: PathBuf,
    credential: Credential,
    timeout: Duration,
    concurrency_hint: u32,
}

impl JobConfig {
    /// Validates raw inputs and builds a configuration.
    ///
    /// Checks run in field order and the first failure is returned; no
    /// partially built configuration is ever observable.
    pub fn build(raw: RawJobInputs) -> Result<Self, ValidationError> {
        let model_id: ModelId = raw
            .model_id
            .as_deref()
            .ok_or(ValidationError::MissingField("model_id"))?
            .parse()?;

        let agent_id: AgentId = raw
            .agent_id
            .as_deref()
            .ok_or(ValidationError::MissingField("agent_id"))?
            .parse()?;

        let output_dir = raw
            .output_dir
            .as_deref()
            .ok_or(ValidationError::MissingField("output_dir"))?;
        let output_dir = resolve_output_dir(output_dir, raw.base_dir.as_deref())?;

        let credential = match raw.credential {
            Some(c) if !c.trim().is_empty() => Credential(c),
            _ => return Err(ValidationError::EmptyCredential),
        };

        let timeout = raw.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(ValidationError::NonPositive { field: "timeout" });
        }

        let concurrency_hint = match raw.concurrency_hint {
            None => DEFAULT_CONCURRENCY_HINT,
            Some(n) if n > 0 => u32::try_from(n).map_err(|_| ValidationError::NonPositive {
                field: "concurrency_hint",
            })?,
            Some(_) => {
                return Err(ValidationError::NonPositive {
                    field: "concurrency_hint",
                })
            }
        };

        Ok(Self {
            model_id,
            agent_id,
            output_dir,
            credential,
            timeout,
            concurrency_hint,
        })
    }

    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Absolute, lexically normalized output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn concurrency_hint(&self) -> u32 {
        self.concurrency_hint
    }
}

/// Resolves `dir` to an absolute path without touching the filesystem.
///
/// `.` components are dropped and `..` pops the previous component; a
/// `..` that would climb above the root is rejected.
fn resolve_output_dir(dir: &Path, base: Option<&Path>) -> Result<PathBuf, ValidationError> {
    let invalid = || ValidationError::InvalidOutputDir(dir.display().to_string());

    if dir.as_os_str().is_empty() || dir.to_string_lossy().contains('\0') {
        return Err(invalid());
    }

    let joined = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        match base {
            Some(base) if base.is_absolute() => base.join(dir),
            _ => return Err(invalid()),
        }
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(p) => normalized.push(p.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() || !normalized.has_root() {
                    return Err(invalid());
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    if !normalized.is_absolute() {
        return Err(invalid());
    }
    Ok(normalized)
}
