//! Execution results: the validated score record and the decoder that
//! produces it from the executor's output directory.

pub mod decoder;
pub mod execution;

pub use decoder::{contained_path, ResultDecoder, MAX_RESULTS_BYTES, RESULTS_FILE};
pub use execution::{ExecutionResult, ScoreSummary};
