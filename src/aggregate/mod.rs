//! Cross-repository aggregation.
//!
//! Groups successful runs by treatment, pairs each treated run with its
//! repository's baseline, and summarizes the resulting deltas into a ranked
//! `BenchmarkSnapshot`. The `significant` flag is a fixed-threshold
//! heuristic (`abs(mean_delta) > threshold`) and snapshots say so in
//! `significance_method`.

pub mod aggregator;
pub mod stats;

pub use aggregator::{
    is_significant, AggregatedStatistic, Aggregator, BenchmarkSnapshot, Exclusion,
    ExclusionReason, DEFAULT_SIGNIFICANCE_THRESHOLD, SIGNIFICANCE_METHOD,
};
pub use stats::Summary;
