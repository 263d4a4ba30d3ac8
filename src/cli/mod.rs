//! Command-line interface for treatment-bench.
//!
//! Provides commands for running benchmark batches, aggregating their runs
//! into snapshots, and inspecting the snapshot history.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, ManifestEntry};
