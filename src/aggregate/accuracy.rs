//! Time-series and time-to-accuracy for accuracy-style metrics

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run::seconds_between;

/// One point of a metric curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Seconds since the run origin
    pub elapsed_secs: f64,
    /// Metric value at that time
    pub value: f64,
}

/// Build a curve from timestamped values, relative to `origin`.
///
/// `points` must already be sorted by timestamp.
#[must_use]
pub fn series(points: &[(DateTime<Utc>, f64)], origin: DateTime<Utc>) -> Vec<SeriesPoint> {
    points
        .iter()
        .map(|&(ts, value)| SeriesPoint {
            elapsed_secs: seconds_between(origin, ts),
            value,
        })
        .collect()
}

/// The sample at which the rolling accuracy first reached the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyCrossing {
    /// Seconds since the run origin
    pub elapsed_secs: f64,
    /// Timestamp of the crossing sample
    pub timestamp: DateTime<Utc>,
    /// Rolling accuracy estimate at the crossing
    pub rolling_value: f64,
    /// Zero-based index of the crossing sample in the curve
    pub index: usize,
}

/// Time-to-accuracy for one metric and threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeToAccuracy {
    /// Threshold the rolling estimate had to reach
    pub threshold: f64,
    /// Rolling window size in samples
    pub window: usize,
    /// `None` means the threshold was never reached
    pub reached: Option<AccuracyCrossing>,
}

impl TimeToAccuracy {
    /// Compute time-to-accuracy over timestamp-sorted values.
    ///
    /// The rolling estimate at sample `i` is the mean of the last `window`
    /// values up to and including `i` (fewer at the start of the curve).
    /// The threshold is reached when the estimate is `>= threshold`.
    #[must_use]
    pub fn compute(
        points: &[(DateTime<Utc>, f64)],
        origin: DateTime<Utc>,
        threshold: f64,
        window: usize,
    ) -> Self {
        let window = window.max(1);
        let mut recent: VecDeque<f64> = VecDeque::with_capacity(window);
        let mut reached = None;

        for (index, &(timestamp, value)) in points.iter().enumerate() {
            if recent.len() == window {
                recent.pop_front();
            }
            recent.push_back(value);

            // Exact window sum, no running total
            let rolling_value = recent.iter().sum::<f64>() / recent.len() as f64;
            if rolling_value >= threshold {
                reached = Some(AccuracyCrossing {
                    elapsed_secs: seconds_between(origin, timestamp),
                    timestamp,
                    rolling_value,
                    index,
                });
                break;
            }
        }

        Self {
            threshold,
            window,
            reached,
        }
    }

    /// Seconds until the threshold was reached, `None` if never.
    #[must_use]
    pub fn elapsed_secs(&self) -> Option<f64> {
        self.reached.map(|c| c.elapsed_secs)
    }

    /// Whether the threshold was reached.
    #[must_use]
    pub const fn is_reached(&self) -> bool {
        self.reached.is_some()
    }
}
