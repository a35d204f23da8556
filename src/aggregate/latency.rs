//! Latency percentiles and throughput

use serde::{Deserialize, Serialize};

/// Distribution of per-sample latencies (seconds) and the resulting
/// throughput.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Samples processed
    pub count: usize,
    /// Median latency
    pub p50: f64,
    /// 95th percentile latency
    pub p95: f64,
    /// 99th percentile latency
    pub p99: f64,
    /// Mean latency
    pub mean: f64,
    /// Fastest sample
    pub min: f64,
    /// Slowest sample
    pub max: f64,
    /// Wall time the samples were processed in
    pub elapsed_secs: f64,
    /// Samples per second; `None` when the elapsed time is zero
    pub throughput: Option<f64>,
}

impl LatencyStats {
    /// Compute stats over latencies, skipping non-finite and negative
    /// values.
    ///
    /// `wall_time_secs` is the elapsed wall time of the stages the samples
    /// were processed in; when unknown the sum of latencies is used
    /// (sequential processing). Returns `None` when no usable latency
    /// remains.
    #[must_use]
    pub fn compute(latencies: &[f64], wall_time_secs: Option<f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = latencies
            .iter()
            .copied()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let elapsed_secs = wall_time_secs.unwrap_or(sum);
        let throughput = (elapsed_secs > 0.0).then(|| count as f64 / elapsed_secs);

        Some(Self {
            count,
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            mean: sum / count as f64,
            min: sorted[0],
            max: sorted[count - 1],
            elapsed_secs,
            throughput,
        })
    }
}

/// Nearest-rank percentile on a **sorted**, non-empty slice.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = (pct / 100.0 * sorted.len() as f64).ceil() as usize;
    let idx = rank.min(sorted.len()).saturating_sub(1);
    sorted[idx]
}
