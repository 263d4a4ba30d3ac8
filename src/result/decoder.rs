//! Reads and validates the executor's results file.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use super::execution::{ExecutionResult, ScoreSummary};
use crate::error::DecodeError;
use crate::job::JobConfig;

/// Results file name the executor writes into its output directory.
pub const RESULTS_FILE: &str = "results.json";

/// Largest results file the decoder will read.
pub const MAX_RESULTS_BYTES: u64 = 4 * 1024 * 1024;

/// Decodes `<output_dir>/results.json` into an `ExecutionResult`.
///
/// Either every required field is present and valid, or decoding fails
/// with an error naming the first offending field.
#[derive(Debug, Clone)]
pub struct ResultDecoder {
    file_name: PathBuf,
    max_bytes: u64,
}

impl ResultDecoder {
    /// Creates a decoder for the default results file.
    pub fn new() -> Self {
        Self {
            file_name: PathBuf::from(RESULTS_FILE),
            max_bytes: MAX_RESULTS_BYTES,
        }
    }

    /// Caps how many bytes of the results file are read.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Uses a different results path, relative to the output directory.
    pub fn with_file_name(mut self, file_name: impl Into<PathBuf>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Resolves the results path, refusing anything outside `output_dir`.
    pub fn results_path(&self, config: &JobConfig) -> Result<PathBuf, DecodeError> {
        contained_path(config.output_dir(), &self.file_name)
    }

    /// Reads, parses and validates the results file for `config`.
    ///
    /// Only a regular file is opened, so a FIFO or device left at the
    /// results path fails fast instead of blocking the caller.
    pub fn decode(&self, config: &JobConfig) -> Result<ExecutionResult, DecodeError> {
        let path = self.results_path(config)?;
        debug!(path = %path.display(), "Decoding executor results");

        let content = read_bounded(&path, self.max_bytes)?;
        decode_str(&content, &path)
    }

    /// Runs `decode` on the blocking pool so async timers keep firing.
    pub async fn decode_async(&self, config: &JobConfig) -> Result<ExecutionResult, DecodeError> {
        let decoder = self.clone();
        let config = config.clone();
        let path = config.output_dir().join(&self.file_name);
        tokio::task::spawn_blocking(move || decoder.decode(&config))
            .await
            .map_err(|e| DecodeError::Read {
                path,
                source: std::io::Error::other(e.to_string()),
            })?
    }
}

fn read_bounded(path: &Path, limit: u64) -> Result<String, DecodeError> {
    let read_error = |source| DecodeError::Read {
        path: path.to_path_buf(),
        source,
    };

    if !std::fs::metadata(path).map_err(read_error)?.is_file() {
        return Err(DecodeError::NotAFile(path.to_path_buf()));
    }
    let file = File::open(path).map_err(read_error)?;
    // re-check the opened handle in case the path was swapped
    if !file.metadata().map_err(read_error)?.is_file() {
        return Err(DecodeError::NotAFile(path.to_path_buf()));
    }

    let mut content = String::new();
    file.take(limit.saturating_add(1))
        .read_to_string(&mut content)
        .map_err(read_error)?;
    if content.len() as u64 > limit {
        return Err(DecodeError::TooLarge {
            path: path.to_path_buf(),
            limit,
        });
    }
    Ok(content)
}

impl Default for ResultDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins `relative` onto `root` and proves the result stays inside `root`.
///
/// Absolute paths and `..` components are rejected before any I/O. The
/// joined path is then canonicalized, so a symlink that points outside
/// the root is rejected as well.
pub fn contained_path(root: &Path, relative: &Path) -> Result<PathBuf, DecodeError> {
    let lexically_safe = !relative.as_os_str().is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !lexically_safe {
        return Err(DecodeError::PathEscape {
            path: root.join(relative),
            root: root.to_path_buf(),
        });
    }

    let canonical_root = canonicalize(root)?;
    let canonical = canonicalize(&canonical_root.join(relative))?;

    if !canonical.starts_with(&canonical_root) {
        return Err(DecodeError::PathEscape {
            path: canonical,
            root: canonical_root,
        });
    }
    Ok(canonical)
}

fn canonicalize(path: &Path) -> Result<PathBuf, DecodeError> {
    path.canonicalize().map_err(|source| match source.kind() {
        ErrorKind::NotFound => DecodeError::NotFound(path.to_path_buf()),
        _ => DecodeError::Read {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Parses results JSON. Fields may sit at the top level or inside `summary`.
pub(crate) fn decode_str(content: &str, path: &Path) -> Result<ExecutionResult, DecodeError> {
    let value: Value = serde_json::from_str(content).map_err(|e| DecodeError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let root = value.as_object().ok_or_else(|| DecodeError::Malformed {
        path: path.to_path_buf(),
        message: "expected a JSON object".to_string(),
    })?;
    let fields = match root.get("summary") {
        Some(Value::Object(summary)) => summary,
        Some(_) => {
            return Err(DecodeError::Malformed {
                path: path.to_path_buf(),
                message: "'summary' must be an object".to_string(),
            })
        }
        None => root,
    };

    let reader = FieldReader { fields, path };
    let summary = ScoreSummary {
        resolved: reader.count("resolved", &["resolved", "resolved_count"])?,
        unresolved: reader.count("unresolved", &["unresolved", "unresolved_count"])?,
        accuracy: reader.probability("accuracy", &["accuracy"])?,
        pass_at_1: reader.probability("pass@1", &["pass@1", "pass_at_1"])?,
        pass_at_3: reader.probability("pass@3", &["pass@3", "pass_at_3"])?,
    };

    ExecutionResult::from_executor(summary).map_err(|e| DecodeError::InvalidField {
        path: path.to_path_buf(),
        field: e.field,
        reason: e.to_string(),
    })
}

struct FieldReader<'a> {
    fields: &'a Map<String, Value>,
    path: &'a Path,
}

impl FieldReader<'_> {
    fn lookup(&self, field: &'static str, keys: &[&str]) -> Result<&Value, DecodeError> {
        keys.iter()
            .find_map(|k| self.fields.get(*k).filter(|v| !v.is_null()))
            .ok_or_else(|| DecodeError::MissingField {
                path: self.path.to_path_buf(),
                field,
            })
    }

    fn invalid(&self, field: &'static str, reason: String) -> DecodeError {
        DecodeError::InvalidField {
            path: self.path.to_path_buf(),
            field,
            reason,
        }
    }

    fn count(&self, field: &'static str, keys: &[&str]) -> Result<u64, DecodeError> {
        let value = self.lookup(field, keys)?;
        value
            .as_u64()
            .ok_or_else(|| self.invalid(field, format!("expected a non-negative integer, got {value}")))
    }

    fn probability(&self, field: &'static str, keys: &[&str]) -> Result<f64, DecodeError> {
        let value = self.lookup(field, keys)?;
        value
            .as_f64()
            .ok_or_else(|| self.invalid(field, format!("expected a number, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::job::RawJobInputs;

    fn config(output_dir: &Path) -> JobConfig {
        JobConfig::build(
            RawJobInputs::new()
                .with_model("anthropic/claude-haiku-4-5")
                .with_agent("claude-code")
                .with_output_dir(output_dir)
                .with_credential("sk-decode")
                .with_timeout(Duration::from_secs(60)),
        )
        .unwrap()
    }

    fn write_results(dir: &Path, body: &str) {
        std::fs::write(dir.join(RESULTS_FILE), body).unwrap();
    }

    #[test]
    fn test_decode_top_level_fields() {
        let dir = TempDir::new().unwrap();
        write_results(
            dir.path(),
            r#"{"resolved": 7, "unresolved": 3, "accuracy": 0.7, "pass@1": 0.7, "pass@3": 0.8}"#,
        );

        let result = ResultDecoder::new().decode(&config(dir.path())).unwrap();
        assert_eq!(result.resolved_count(), 7);
        assert_eq!(result.unresolved_count(), 3);
        assert!((result.score() - 0.7).abs() < f64::EPSILON);
        assert!((result.pass_at_3() - 0.8).abs() < f64::EPSILON);
        assert!(result.task_solved());
        assert!(!result.is_synthetic());
    }

    #[test]
    fn test_decode_nested_summary_with_aliases() {
        let dir = TempDir::new().unwrap();
        write_results(
            dir.path(),
            r#"{"run": "x", "summary": {"resolved_count": 0, "unresolved_count": 4, "accuracy": 0, "pass_at_1": 0.0, "pass_at_3": 0.25}}"#,
        );

        let result = ResultDecoder::new().decode(&config(dir.path())).unwrap();
        assert_eq!(result.resolved_count(), 0);
        assert!(!result.task_solved());
    }

    #[test]
    fn test_missing_field_is_named() {
        let dir = TempDir::new().unwrap();
        write_results(
            dir.path(),
            r#"{"resolved": 1, "unresolved": 1, "accuracy": 0.5, "pass@1": 0.5}"#,
        );

        let err = ResultDecoder::new().decode(&config(dir.path())).unwrap_err();
        match err {
            DecodeError::MissingField { field, .. } => assert_eq!(field, "pass@3"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        let cases = [
            (r#"{"resolved": -1, "unresolved": 1, "accuracy": 0.5, "pass@1": 0.5, "pass@3": 0.5}"#, "resolved"),
            (r#"{"resolved": 1.5, "unresolved": 1, "accuracy": 0.5, "pass@1": 0.5, "pass@3": 0.5}"#, "resolved"),
            (r#"{"resolved": 1, "unresolved": 1, "accuracy": 1.2, "pass@1": 0.5, "pass@3": 0.5}"#, "accuracy"),
            (r#"{"resolved": 1, "unresolved": 1, "accuracy": 0.5, "pass@1": "high", "pass@3": 0.5}"#, "pass@1"),
        ];

        for (body, expected) in cases {
            write_results(dir.path(), body);
            match ResultDecoder::new().decode(&config(dir.path())).unwrap_err() {
                DecodeError::InvalidField { field, .. } => assert_eq!(field, expected, "{body}"),
                other => panic!("unexpected error for {body}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_malformed_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = ResultDecoder::new().decode(&config(dir.path())).unwrap_err();
        assert!(matches!(err, DecodeError::NotFound(_)));

        write_results(dir.path(), "{not json");
        let err = ResultDecoder::new().decode(&config(dir.path())).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));

        write_results(dir.path(), "[1, 2, 3]");
        let err = ResultDecoder::new().decode(&config(dir.path())).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn test_parent_dir_escape_rejected() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(dir.path().join("stolen.json"), "{}").unwrap();

        for escape in ["../stolen.json", "./../stolen.json", "nested/../../stolen.json"] {
            let err = ResultDecoder::new()
                .with_file_name(escape)
                .decode(&config(&out))
                .unwrap_err();
            assert!(matches!(err, DecodeError::PathEscape { .. }), "{escape}");
        }
    }

    #[test]
    fn test_absolute_path_rejected() {
        let dir = TempDir::new().unwrap();
        let err = contained_path(dir.path(), Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, DecodeError::PathEscape { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        let outside = dir.path().join("outside.json");
        std::fs::write(
            &outside,
            r#"{"resolved": 1, "unresolved": 0, "accuracy": 1, "pass@1": 1, "pass@3": 1}"#,
        )
        .unwrap();
        std::os::unix::fs::symlink(&outside, out.join(RESULTS_FILE)).unwrap();

        let err = ResultDecoder::new().decode(&config(&out)).unwrap_err();
        assert!(matches!(err, DecodeError::PathEscape { .. }));
    }

    #[test]
    fn test_nested_relative_path_allowed() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("reports")).unwrap();
        std::fs::write(
            dir.path().join("reports").join("final.json"),
            r#"{"resolved": 2, "unresolved": 2, "accuracy": 0.5, "pass@1": 0.5, "pass@3": 0.6}"#,
        )
        .unwrap();

        let result = ResultDecoder::new()
            .with_file_name("reports/final.json")
            .decode(&config(dir.path()))
            .unwrap();
        assert_eq!(result.resolved_count(), 2);
    }

    #[test]
    fn test_directory_at_results_path_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(RESULTS_FILE)).unwrap();

        let err = ResultDecoder::new().decode(&config(dir.path())).unwrap_err();
        assert!(matches!(err, DecodeError::NotAFile(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fifo_at_results_path_fails_fast() {
        let dir = TempDir::new().unwrap();
        let fifo = dir.path().join(RESULTS_FILE);
        let status = std::process::Command::new("mkfifo")
            .arg(&fifo)
            .status()
            .unwrap();
        assert!(status.success());

        let decoded = tokio::time::timeout(
            Duration::from_secs(10),
            ResultDecoder::new().decode_async(&config(dir.path())),
        )
        .await
        .expect("decoding a FIFO must not block");
        assert!(matches!(decoded, Err(DecodeError::NotAFile(_))));
    }

    #[test]
    fn test_oversized_results_rejected() {
        let dir = TempDir::new().unwrap();
        let body = r#"{"resolved": 1, "unresolved": 1, "accuracy": 0.5, "pass@1": 0.5, "pass@3": 0.5}"#;
        write_results(dir.path(), body);

        let err = ResultDecoder::new()
            .with_max_bytes(16)
            .decode(&config(dir.path()))
            .unwrap_err();
        assert!(matches!(err, DecodeError::TooLarge { limit: 16, .. }));

        let result = ResultDecoder::new()
            .with_max_bytes(body.len() as u64)
            .decode(&config(dir.path()))
            .unwrap();
        assert_eq!(result.resolved_count(), 1);
    }
}
