//! Run - one benchmarked execution of a pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sample::Sample;

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is open and accepting samples.
    Running,
    /// Run was closed normally at benchmark end.
    Completed,
    /// Run was stopped early; its report is built from partial data.
    Aborted,
}

impl RunStatus {
    /// Whether the run no longer accepts samples.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Run metadata: identity, provenance and lifecycle of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunMetadata {
    run_id: String,
    tool: String,
    pipeline: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    config: Option<serde_json::Value>,
    status: RunStatus,
    started_at: DateTime<Utc>,
    #[serde(default)]
    ended_at: Option<DateTime<Utc>>,
}

impl RunMetadata {
    /// Create metadata for a run starting now.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Unique identifier for the run
    /// * `tool` - ML tool under test (e.g., "tensorflow", "pytorch")
    /// * `pipeline` - Pipeline name (e.g., "mnist", "stock-lstm")
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        tool: impl Into<String>,
        pipeline: impl Into<String>,
    ) -> Self {
        RunMetadataBuilder::new(run_id).tool(tool).pipeline(pipeline).build()
    }

    /// Create a builder for metadata with optional fields.
    #[must_use]
    pub fn builder(run_id: impl Into<String>) -> RunMetadataBuilder {
        RunMetadataBuilder::new(run_id)
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the tool name.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Get the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Get the description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the pipeline configuration, if any.
    #[must_use]
    pub const fn config(&self) -> Option<&serde_json::Value> {
        self.config.as_ref()
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get the end timestamp, if the run is closed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Wall time between start and end in seconds, if closed.
    #[must_use]
    pub fn elapsed_secs(&self) -> Option<f64> {
        self.ended_at.map(|end| seconds_between(self.started_at, end))
    }

    fn close(&mut self, status: RunStatus, at: DateTime<Utc>) {
        self.status = status;
        self.ended_at = Some(at);
    }

    fn reopen(&mut self) {
        self.status = RunStatus::Running;
        self.ended_at = None;
    }
}

/// Builder for `RunMetadata`.
#[derive(Debug)]
pub struct RunMetadataBuilder {
    run_id: String,
    tool: String,
    pipeline: String,
    description: Option<String>,
    config: Option<serde_json::Value>,
    started_at: DateTime<Utc>,
}

impl RunMetadataBuilder {
    /// Create a new builder with the run ID. Start time defaults to now.
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            tool: String::new(),
            pipeline: String::new(),
            description: None,
            config: None,
            started_at: Utc::now(),
        }
    }

    /// Set the tool name.
    #[must_use]
    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Set the pipeline name.
    #[must_use]
    pub fn pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = pipeline.into();
        self
    }

    /// Set a human-readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the pipeline configuration.
    #[must_use]
    pub fn config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a custom start timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Build the `RunMetadata` in `Running` status.
    #[must_use]
    pub fn build(self) -> RunMetadata {
        RunMetadata {
            run_id: self.run_id,
            tool: self.tool,
            pipeline: self.pipeline,
            description: self.description,
            config: self.config,
            status: RunStatus::Running,
            started_at: self.started_at,
            ended_at: None,
        }
    }
}

/// Run represents an ordered sequence of samples plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    #[serde(flatten)]
    metadata: RunMetadata,
    samples: Vec<Sample>,
}

impl Run {
    /// Create an open run with no samples.
    #[must_use]
    pub const fn new(metadata: RunMetadata) -> Self {
        Self {
            metadata,
            samples: Vec::new(),
        }
    }

    /// Assemble a run from metadata and already recorded samples.
    ///
    /// Used when loading archives and in tests.
    #[must_use]
    pub const fn from_samples(metadata: RunMetadata, samples: Vec<Sample>) -> Self {
        Self { metadata, samples }
    }

    /// Get the metadata.
    #[must_use]
    pub const fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        self.metadata.run_id()
    }

    /// Get the samples in recording order.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Check if the run has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Distinct metric names in first-appearance order.
    #[must_use]
    pub fn metric_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for sample in &self.samples {
            if !names.contains(&sample.metric_name()) {
                names.push(sample.metric_name());
            }
        }
        names
    }

    /// Keep only samples matching the predicate.
    #[must_use]
    pub fn retain_samples<F>(mut self, mut keep: F) -> Self
    where
        F: FnMut(&Sample) -> bool,
    {
        self.samples.retain(|s| keep(s));
        self
    }

    pub(crate) fn extend(&mut self, samples: impl IntoIterator<Item = Sample>) {
        self.samples.extend(samples);
    }

    /// Close the run with the given final status.
    pub fn close(&mut self, status: RunStatus) {
        self.metadata.close(status, Utc::now());
    }

    /// Undo [`Run::close`] when the close could not be persisted.
    pub(crate) fn reopen(&mut self) {
        self.metadata.reopen();
    }
}

/// Signed seconds from `from` to `to`, with sub-millisecond precision.
pub(crate) fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    delta
        .num_microseconds()
        .map_or_else(|| delta.num_milliseconds() as f64 / 1e3, |us| us as f64 / 1e6)
}
