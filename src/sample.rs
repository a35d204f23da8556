//! Sample - a single raw measurement taken during a pipeline stage

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Reserved metric name for the wall time of a whole stage, in seconds.
///
/// Written by [`Recorder::time_stage`](crate::recorder::Recorder::time_stage)
/// and used as the denominator for throughput.
pub const STAGE_TIME: &str = "stage_time";

/// Pipeline stage a sample was taken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Loading and preprocessing input data.
    DataPrep,
    /// Model training.
    Train,
    /// Validation against held-out data.
    Validate,
    /// Inference on unseen data.
    Infer,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Self; 4] = [Self::DataPrep, Self::Train, Self::Validate, Self::Infer];

    /// Canonical snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataPrep => "data_prep",
            Self::Train => "train",
            Self::Validate => "validate",
            Self::Infer => "infer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "data_prep" | "dataprep" | "data-prep" => Ok(Self::DataPrep),
            "train" | "training" => Ok(Self::Train),
            "validate" | "validation" => Ok(Self::Validate),
            "infer" | "inference" => Ok(Self::Infer),
            other => Err(Error::InvalidInput(format!(
                "unknown stage '{other}' (expected data_prep, train, validate or infer)"
            ))),
        }
    }
}

/// Value carried by a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    /// A plain measurement (seconds, bytes, watts, loss, accuracy, ...).
    ///
    /// Non-finite values are kept and serialized as `"NaN"`, `"inf"` or
    /// `"-inf"`.
    Scalar(#[serde(with = "scalar_repr")] f64),
    /// One classified example: ground-truth class and predicted class.
    Prediction {
        /// Ground-truth class index
        truth: usize,
        /// Predicted class index
        predicted: usize,
    },
}

impl MetricValue {
    /// Build a prediction from a per-class score vector (argmax).
    ///
    /// Returns `None` for an empty vector. Ties resolve to the lowest class
    /// index; NaN scores never win.
    #[must_use]
    pub fn from_scores(truth: usize, scores: &[f64]) -> Option<Self> {
        let mut best: Option<(usize, f64)> = None;
        for (class, &score) in scores.iter().enumerate() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, current)) if score <= current => {}
                _ => best = Some((class, score)),
            }
        }
        best.map(|(predicted, _)| Self::Prediction { truth, predicted })
    }

    /// Scalar payload, if any.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Prediction { .. } => None,
        }
    }

    /// `(truth, predicted)` payload, if any.
    #[must_use]
    pub const fn as_prediction(&self) -> Option<(usize, usize)> {
        match self {
            Self::Prediction { truth, predicted } => Some((*truth, *predicted)),
            Self::Scalar(_) => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

/// JSON has no NaN or infinity: those values travel as strings.
mod scalar_repr {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(ScalarVisitor)
    }

    struct ScalarVisitor;

    impl Visitor<'_> for ScalarVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number, \"NaN\", \"inf\" or \"-inf\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        #[allow(clippy::cast_precision_loss)]
        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        #[allow(clippy::cast_precision_loss)]
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }
}

/// Sample represents one raw measurement.
///
/// Samples are immutable once recorded: fields are private and only
/// exposed through getters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    stage: Stage,
    timestamp: DateTime<Utc>,
    metric_name: String,
    value: MetricValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl Sample {
    /// Create a new sample.
    ///
    /// # Arguments
    ///
    /// * `stage` - Pipeline stage the measurement belongs to
    /// * `metric_name` - Metric name (e.g., "memory", "accuracy")
    /// * `value` - Measured value
    /// * `timestamp` - Time the measurement was taken
    #[must_use]
    pub fn new(
        stage: Stage,
        metric_name: impl Into<String>,
        value: impl Into<MetricValue>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            stage,
            timestamp,
            metric_name: metric_name.into(),
            value: value.into(),
            description: None,
        }
    }

    /// Create a builder for a sample with optional fields.
    #[must_use]
    pub fn builder(
        stage: Stage,
        metric_name: impl Into<String>,
        value: impl Into<MetricValue>,
    ) -> SampleBuilder {
        SampleBuilder::new(stage, metric_name, value)
    }

    /// Get the stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Get the timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get the metric name.
    #[must_use]
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Get the value.
    #[must_use]
    pub const fn value(&self) -> MetricValue {
        self.value
    }

    /// Get the free-form description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Builder for `Sample`.
#[derive(Debug)]
pub struct SampleBuilder {
    stage: Stage,
    metric_name: String,
    value: MetricValue,
    timestamp: DateTime<Utc>,
    description: Option<String>,
}

impl SampleBuilder {
    /// Create a new builder with required fields. The timestamp defaults to now.
    #[must_use]
    pub fn new(stage: Stage, metric_name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        Self {
            stage,
            metric_name: metric_name.into(),
            value: value.into(),
            timestamp: Utc::now(),
            description: None,
        }
    }

    /// Set a custom timestamp.
    #[must_use]
    pub const fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build the `Sample`.
    #[must_use]
    pub fn build(self) -> Sample {
        Sample {
            stage: self.stage,
            timestamp: self.timestamp,
            metric_name: self.metric_name,
            value: self.value,
            description: self.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_round_trip_names() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert_eq!("Inference".parse::<Stage>().unwrap(), Stage::Infer);
        assert!("deploy".parse::<Stage>().is_err());
    }

    #[test]
    fn test_stage_serde_snake_case() {
        let json = serde_json::to_string(&Stage::DataPrep).unwrap();
        assert_eq!(json, "\"data_prep\"");
    }

    #[test]
    fn test_from_scores_argmax() {
        let value = MetricValue::from_scores(2, &[0.1, 0.7, 0.2]).unwrap();
        assert_eq!(value.as_prediction(), Some((2, 1)));
    }

    #[test]
    fn test_from_scores_ties_and_nan() {
        let value = MetricValue::from_scores(0, &[f64::NAN, 0.5, 0.5]).unwrap();
        assert_eq!(value.as_prediction(), Some((0, 1)));
        assert!(MetricValue::from_scores(0, &[]).is_none());
    }

    #[test]
    fn test_sample_builder_description() {
        let sample = Sample::builder(Stage::Train, "loss", 0.3)
            .description("epoch 1")
            .build();
        assert_eq!(sample.description(), Some("epoch 1"));
        assert_eq!(sample.value().as_scalar(), Some(0.3));
    }

    #[test]
    fn test_non_finite_scalars_survive_json() {
        for (value, encoded) in [
            (f64::NAN, "\"NaN\""),
            (f64::INFINITY, "\"inf\""),
            (f64::NEG_INFINITY, "\"-inf\""),
        ] {
            let json = serde_json::to_string(&MetricValue::Scalar(value)).unwrap();
            assert_eq!(json, format!("{{\"scalar\":{encoded}}}"));
            let back: MetricValue = serde_json::from_str(&json).unwrap();
            let back = back.as_scalar().unwrap();
            assert!(back.is_nan() == value.is_nan() && (value.is_nan() || back == value));
        }
        let finite: MetricValue = serde_json::from_str(r#"{"scalar":2}"#).unwrap();
        assert_eq!(finite, MetricValue::Scalar(2.0));
        assert!(serde_json::from_str::<MetricValue>(r#"{"scalar":"big"}"#).is_err());
    }
}
