//! Summary statistics for scalar metrics

use serde::{Deserialize, Serialize};

/// Min/max/mean over the finite values of a scalar metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    /// Number of finite values aggregated
    pub count: usize,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Total of all values
    pub sum: f64,
    /// Non-finite values that were skipped
    pub skipped: usize,
}

impl SummaryStats {
    /// Compute statistics, skipping NaN and infinities.
    ///
    /// Returns `None` when no finite value remains.
    #[must_use]
    pub fn from_values<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut count = 0usize;
        let mut skipped = 0usize;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;

        for v in values {
            if !v.is_finite() {
                skipped += 1;
                continue;
            }
            count += 1;
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }

        (count > 0).then(|| Self {
            count,
            min,
            max,
            mean: sum / count as f64,
            sum,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_stats() {
        let stats = SummaryStats::from_values([3.0, 1.0, 2.0]).unwrap();
        assert_eq!(stats.count, 3);
        assert!((stats.min - 1.0).abs() < f64::EPSILON);
        assert!((stats.max - 3.0).abs() < f64::EPSILON);
        assert!((stats.mean - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_skips_non_finite() {
        let stats = SummaryStats::from_values([1.0, f64::NAN, f64::INFINITY, 3.0]).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.skipped, 2);
        assert!((stats.mean - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_is_none() {
        assert!(SummaryStats::from_values(std::iter::empty()).is_none());
        assert!(SummaryStats::from_values([f64::NAN]).is_none());
    }
}
