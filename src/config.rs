//! Aggregator configuration
//!
//! Defaults cover the metric names most pipelines use. A JSON file can
//! override any subset of fields:
//!
//! ```json
//! { "accuracy_threshold": 0.95, "accuracy_window": 3, "latency_metrics": ["latency", "batch_latency"] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregate::MAX_CLASSES;
use crate::{Error, Result};

/// Default time-to-accuracy threshold.
pub const DEFAULT_ACCURACY_THRESHOLD: f64 = 0.9;

/// Controls how the [`Aggregator`](crate::aggregate::Aggregator) interprets
/// metric names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Rolling accuracy must reach this value for time-to-accuracy.
    pub accuracy_threshold: f64,
    /// Number of most recent samples in the rolling accuracy estimate.
    pub accuracy_window: usize,
    /// Metrics that get a series and time-to-accuracy.
    pub accuracy_metrics: Vec<String>,
    /// Metrics that get a series.
    pub loss_metrics: Vec<String>,
    /// Per-sample latencies in seconds; get percentiles and throughput.
    pub latency_metrics: Vec<String>,
    /// Minimum confusion matrix dimension.
    pub num_classes: Option<usize>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            accuracy_threshold: DEFAULT_ACCURACY_THRESHOLD,
            accuracy_window: 1,
            accuracy_metrics: vec!["accuracy".to_string(), "val_accuracy".to_string()],
            loss_metrics: vec!["loss".to_string(), "val_loss".to_string()],
            latency_metrics: vec!["latency".to_string()],
            num_classes: None,
        }
    }
}

impl AggregatorConfig {
    /// Load a configuration from a JSON file. Missing fields keep defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed, or fails
    /// [`AggregatorConfig::validate`].
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the time-to-accuracy threshold.
    #[must_use]
    pub const fn with_accuracy_threshold(mut self, threshold: f64) -> Self {
        self.accuracy_threshold = threshold;
        self
    }

    /// Set the rolling accuracy window.
    #[must_use]
    pub const fn with_accuracy_window(mut self, window: usize) -> Self {
        self.accuracy_window = window;
        self
    }

    /// Add an accuracy-style metric name.
    #[must_use]
    pub fn with_accuracy_metric(mut self, name: impl Into<String>) -> Self {
        self.accuracy_metrics.push(name.into());
        self
    }

    /// Add a loss-style metric name.
    #[must_use]
    pub fn with_loss_metric(mut self, name: impl Into<String>) -> Self {
        self.loss_metrics.push(name.into());
        self
    }

    /// Add a latency metric name.
    #[must_use]
    pub fn with_latency_metric(mut self, name: impl Into<String>) -> Self {
        self.latency_metrics.push(name.into());
        self
    }

    /// Set the minimum number of classes for confusion matrices.
    #[must_use]
    pub const fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = Some(num_classes);
        self
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the threshold is outside `[0, 1]`,
    /// the window is zero, or `num_classes` exceeds [`MAX_CLASSES`].
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.accuracy_threshold) {
            return Err(Error::InvalidInput(format!(
                "accuracy_threshold must be within [0, 1], got {}",
                self.accuracy_threshold
            )));
        }
        if self.accuracy_window == 0 {
            return Err(Error::InvalidInput(
                "accuracy_window must be at least 1".to_string(),
            ));
        }
        if let Some(n) = self.num_classes.filter(|&n| n > MAX_CLASSES) {
            return Err(Error::InvalidInput(format!(
                "num_classes must be at most {MAX_CLASSES}, got {n}"
            )));
        }
        Ok(())
    }

    pub(crate) fn is_accuracy_metric(&self, name: &str) -> bool {
        self.accuracy_metrics.iter().any(|m| m == name)
    }

    pub(crate) fn is_loss_metric(&self, name: &str) -> bool {
        self.loss_metrics.iter().any(|m| m == name)
    }

    pub(crate) fn is_latency_metric(&self, name: &str) -> bool {
        self.latency_metrics.iter().any(|m| m == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = AggregatorConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_accuracy_metric("accuracy"));
        assert!(config.is_latency_metric("latency"));
        assert!(!config.is_loss_metric("memory"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(AggregatorConfig::default()
            .with_accuracy_threshold(1.5)
            .validate()
            .is_err());
        assert!(AggregatorConfig::default()
            .with_accuracy_threshold(f64::NAN)
            .validate()
            .is_err());
        assert!(AggregatorConfig::default()
            .with_accuracy_window(0)
            .validate()
            .is_err());
        assert!(AggregatorConfig::default()
            .with_num_classes(MAX_CLASSES + 1)
            .validate()
            .is_err());
        assert!(AggregatorConfig::default()
            .with_num_classes(MAX_CLASSES)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AggregatorConfig =
            serde_json::from_str(r#"{"accuracy_threshold": 0.75}"#).unwrap();
        assert!((config.accuracy_threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.accuracy_window, 1);
        assert_eq!(config.latency_metrics, vec!["latency".to_string()]);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        std::fs::write(&path, r#"{"accuracy_window": 5, "num_classes": 10}"#).unwrap();
        let config = AggregatorConfig::from_json_file(&path).unwrap();
        assert_eq!(config.accuracy_window, 5);
        assert_eq!(config.num_classes, Some(10));
    }
}
