//! Descriptive statistics over score deltas.

use serde::{Deserialize, Serialize};

/// Mean, median and sample standard deviation of a set of values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl Summary {
    /// Summarizes `values`; `None` when empty.
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            mean: mean(values),
            median: median(values),
            std_dev: sample_std_dev(values),
            count: values.len(),
        })
    }
}

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median; the mean of the two middle values for an even count.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample variance (n - 1 denominator); 0.0 with fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    let count = values.len();
    if count < 2 {
        return 0.0;
    }
    let mean = mean(values);
    let variance_sum: f64 = values
        .iter()
        .map(|v| {
            let diff = mean - *v;
            diff * diff
        })
        .sum();
    variance_sum / (count - 1) as f64
}

pub fn sample_std_dev(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_reference_deltas() {
        let summary = Summary::of(&[0.10, 0.12, 0.15]).unwrap();
        assert!((summary.mean - 0.123_333_333_3).abs() < 1e-6);
        assert!((summary.median - 0.12).abs() < EPS);
        // sqrt(((0.0233)^2 + (0.0033)^2 + (0.0267)^2) / 2)
        assert!((summary.std_dev - 0.025_166_114_8).abs() < 1e-6);
        assert_eq!(summary.count, 3);
    }

    #[test]
    fn test_even_count_median() {
        assert!((median(&[4.0, 1.0, 3.0, 2.0]) - 2.5).abs() < EPS);
    }

    #[test]
    fn test_single_value() {
        let summary = Summary::of(&[0.42]).unwrap();
        assert!((summary.mean - 0.42).abs() < EPS);
        assert!((summary.median - 0.42).abs() < EPS);
        assert_eq!(summary.std_dev, 0.0);
    }

    #[test]
    fn test_empty() {
        assert!(Summary::of(&[]).is_none());
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(sample_variance(&[]), 0.0);
    }

    #[test]
    fn test_negative_deltas() {
        let summary = Summary::of(&[-0.2, 0.0, 0.2]).unwrap();
        assert!(summary.mean.abs() < EPS);
        assert!(summary.median.abs() < EPS);
        assert!((summary.std_dev - 0.2).abs() < EPS);
    }
}
