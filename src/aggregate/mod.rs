//! Metric Aggregator - derives statistics from a run's samples
//!
//! ## Dispatch
//!
//! Samples are grouped by metric name. Each group is aggregated by what
//! it holds and by how the [`AggregatorConfig`] classifies its name:
//!
//! ```text
//! scalar samples ──┬─ latency metric ──> LatencyStats (p50/p95/p99, throughput)
//!                  ├─ otherwise ───────> SummaryStats (min/max/mean)
//!                  ├─ accuracy metric ─> Series + TimeToAccuracy
//!                  └─ loss metric ─────> Series
//! prediction samples ─────────────────> ConfusionMatrix + precision/recall/F1
//! ```
//!
//! Data-quality problems never fail aggregation: they produce
//! [`MetricEntry::Undefined`] entries and a warning.
//!
//! ## Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use e2ebench::aggregate::Aggregator;
//! use e2ebench::config::AggregatorConfig;
//! use e2ebench::report::MetricEntry;
//! use e2ebench::run::{Run, RunMetadata};
//! use e2ebench::sample::{Sample, Stage};
//!
//! # fn main() -> e2ebench::Result<()> {
//! let start = Utc::now();
//! let metadata = RunMetadata::builder("run-001").started_at(start).build();
//! let samples = [0.6, 0.85, 0.93]
//!     .iter()
//!     .enumerate()
//!     .map(|(epoch, &acc)| {
//!         Sample::new(Stage::Validate, "accuracy", acc, start + Duration::seconds(10 * (epoch as i64 + 1)))
//!     })
//!     .collect();
//! let run = Run::from_samples(metadata, samples);
//!
//! let aggregator = Aggregator::new(AggregatorConfig::default().with_accuracy_threshold(0.9))?;
//! let report = aggregator.aggregate(&run);
//!
//! match report.get("accuracy.time_to_accuracy") {
//!     Some(MetricEntry::TimeToAccuracy(tta)) => assert_eq!(tta.elapsed_secs(), Some(30.0)),
//!     other => panic!("unexpected entry: {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

mod accuracy;
mod confusion;
mod latency;
mod stats;

pub use accuracy::{series, AccuracyCrossing, SeriesPoint, TimeToAccuracy};
pub use confusion::{ClassMetrics, ClassificationReport, ConfusionMatrix, MAX_CLASSES};
pub use latency::LatencyStats;
pub use stats::SummaryStats;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::config::AggregatorConfig;
use crate::report::{AggregatedReport, MetricEntry};
use crate::run::Run;
use crate::sample::{MetricValue, Sample, Stage, STAGE_TIME};
use crate::Result;

/// Computes an [`AggregatedReport`] from a [`Run`].
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    config: AggregatorConfig,
}

/// Aggregate a run with the default configuration.
#[must_use]
pub fn aggregate(run: &Run) -> AggregatedReport {
    Aggregator::default().aggregate(run)
}

impl Aggregator {
    /// Create an aggregator.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration fails validation.
    pub fn new(config: AggregatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Aggregate every metric of the run.
    ///
    /// An empty run yields an empty report: every metric reads as
    /// undefined.
    #[must_use]
    pub fn aggregate(&self, run: &Run) -> AggregatedReport {
        let mut report = AggregatedReport::new(run.metadata());
        if run.is_empty() {
            debug!(run_id = run.run_id(), "empty run, all metrics undefined");
            return report;
        }

        let origin = run
            .samples()
            .iter()
            .map(Sample::timestamp)
            .min()
            .map_or(run.metadata().started_at(), |first| {
                first.min(run.metadata().started_at())
            });

        let groups = group_by_metric(run.samples());
        let stage_times = stage_wall_times(run.samples());

        for (name, mut samples) in groups {
            samples.sort_by_key(|s| s.timestamp());
            self.aggregate_metric(&mut report, name, &samples, origin, &stage_times);
        }

        if let Some(wall_time) = run.metadata().elapsed_secs() {
            report.insert("run.wall_time", MetricEntry::Scalar { value: wall_time });
        }

        debug!(run_id = run.run_id(), entries = report.len(), "run aggregated");
        report
    }

    fn aggregate_metric(
        &self,
        report: &mut AggregatedReport,
        name: &str,
        samples: &[&Sample],
        origin: DateTime<Utc>,
        stage_times: &FxHashMap<Stage, f64>,
    ) {
        let mut scalars: Vec<(DateTime<Utc>, f64)> = Vec::new();
        let mut predictions: Vec<(usize, usize)> = Vec::new();
        let mut stages: Vec<Stage> = Vec::new();

        for sample in samples {
            match sample.value() {
                MetricValue::Scalar(v) => {
                    scalars.push((sample.timestamp(), v));
                    if !stages.contains(&sample.stage()) {
                        stages.push(sample.stage());
                    }
                }
                MetricValue::Prediction { truth, predicted } => predictions.push((truth, predicted)),
            }
        }

        if !scalars.is_empty() {
            self.aggregate_scalars(report, name, &scalars, &stages, origin, stage_times);
        }

        if !predictions.is_empty() {
            let key = if scalars.is_empty() {
                name.to_string()
            } else {
                format!("{name}.confusion")
            };
            let entry = match ConfusionMatrix::from_pairs(
                predictions,
                self.config.num_classes.unwrap_or(0),
            ) {
                Ok(matrix) => ClassificationReport::from_matrix(matrix).map_or_else(
                    || MetricEntry::undefined("no predictions"),
                    MetricEntry::Classification,
                ),
                Err(e) => {
                    warn!(metric = name, error = %e, "confusion matrix undefined");
                    MetricEntry::undefined(e.to_string())
                }
            };
            report.insert(key, entry);
        }
    }

    fn aggregate_scalars(
        &self,
        report: &mut AggregatedReport,
        name: &str,
        scalars: &[(DateTime<Utc>, f64)],
        stages: &[Stage],
        origin: DateTime<Utc>,
        stage_times: &FxHashMap<Stage, f64>,
    ) {
        let finite: Vec<(DateTime<Utc>, f64)> =
            scalars.iter().copied().filter(|(_, v)| v.is_finite()).collect();
        let skipped = scalars.len() - finite.len();
        if skipped > 0 {
            warn!(metric = name, skipped, "skipping non-finite values");
        }

        let undefined = || {
            MetricEntry::undefined(format!(
                "no finite values ({skipped} non-finite sample(s) skipped)"
            ))
        };

        let entry = if self.config.is_latency_metric(name) {
            let latencies: Vec<f64> = finite.iter().map(|&(_, v)| v).collect();
            let wall_time = stage_wall_time(stages, stage_times);
            LatencyStats::compute(&latencies, wall_time)
                .map_or_else(undefined, MetricEntry::Latency)
        } else {
            SummaryStats::from_values(scalars.iter().map(|&(_, v)| v))
                .map_or_else(undefined, MetricEntry::Summary)
        };
        if !entry.is_defined() {
            warn!(metric = name, "metric undefined");
        }
        report.insert(name, entry);

        let is_accuracy = self.config.is_accuracy_metric(name);
        if is_accuracy || self.config.is_loss_metric(name) {
            report.insert(
                format!("{name}.series"),
                MetricEntry::Series {
                    points: series(&finite, origin),
                },
            );
        }

        if is_accuracy {
            let tta_entry = if finite.is_empty() {
                undefined()
            } else {
                MetricEntry::TimeToAccuracy(TimeToAccuracy::compute(
                    &finite,
                    origin,
                    self.config.accuracy_threshold,
                    self.config.accuracy_window,
                ))
            };
            report.insert(format!("{name}.time_to_accuracy"), tta_entry);
        }

        if name == STAGE_TIME {
            for stage in stages {
                if let Some(&total) = stage_times.get(stage) {
                    report.insert(
                        format!("{STAGE_TIME}.{stage}"),
                        MetricEntry::Scalar { value: total },
                    );
                }
            }
        }
    }
}

/// Group samples by metric name, keeping first-appearance order.
fn group_by_metric(samples: &[Sample]) -> Vec<(&str, Vec<&Sample>)> {
    let mut index: FxHashMap<&str, usize> = FxHashMap::default();
    let mut groups: Vec<(&str, Vec<&Sample>)> = Vec::new();
    for sample in samples {
        let name = sample.metric_name();
        let slot = *index.entry(name).or_insert_with(|| {
            groups.push((name, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(sample);
    }
    groups
}

/// Total recorded `stage_time` per stage.
fn stage_wall_times(samples: &[Sample]) -> FxHashMap<Stage, f64> {
    let mut totals: FxHashMap<Stage, f64> = FxHashMap::default();
    for sample in samples.iter().filter(|s| s.metric_name() == STAGE_TIME) {
        if let Some(v) = sample.value().as_scalar().filter(|v| v.is_finite()) {
            *totals.entry(sample.stage()).or_insert(0.0) += v;
        }
    }
    totals
}

/// Wall time of the given stages, if any of them was timed.
fn stage_wall_time(stages: &[Stage], stage_times: &FxHashMap<Stage, f64>) -> Option<f64> {
    let timed: Vec<f64> = stages
        .iter()
        .filter_map(|stage| stage_times.get(stage).copied())
        .collect();
    (!timed.is_empty()).then(|| timed.iter().sum())
}
