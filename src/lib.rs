//! # e2ebench: End-to-End ML Pipeline Benchmarking
//!
//! e2ebench instruments the stages of a machine-learning pipeline (data
//! preparation, training, validation, inference), records raw measurements
//! into runs, derives statistics from them, and compares runs of different
//! tools side by side.
//!
//! ## Components
//!
//! ```text
//! pipeline ──record()──> Recorder ──flush/close──> SampleSink (memory, JSON, Parquet)
//!                            │
//!                          Run ──> Aggregator ──> AggregatedReport ──> compare() ──> Comparison
//! ```
//!
//! - **Recorder** ([`recorder`]): in-memory, synchronous sample capture.
//! - **Aggregator** ([`aggregate`]): summary stats, time-to-accuracy,
//!   confusion matrices, latency percentiles and throughput.
//! - **Comparator** ([`compare`]): aligns reports by metric name, `N/A` for
//!   missing metrics.
//!
//! ## Example
//!
//! ```rust
//! use e2ebench::aggregate::aggregate;
//! use e2ebench::recorder::Recorder;
//! use e2ebench::run::RunMetadata;
//! use e2ebench::sample::{MetricValue, Stage};
//!
//! # fn main() -> e2ebench::Result<()> {
//! let mut recorder = Recorder::in_memory();
//! recorder.start_run(RunMetadata::new("run-001", "tensorflow", "fashion-mnist"))?;
//!
//! recorder.time_stage(Stage::Train, || {
//!     // train the model
//! })?;
//! recorder.record_now(Stage::Validate, "accuracy", 0.91)?;
//! recorder.record_now(Stage::Infer, "prediction", MetricValue::Prediction { truth: 3, predicted: 3 })?;
//!
//! let run = recorder.finish()?;
//! let report = aggregate(&run);
//! assert!(report.defined("accuracy.time_to_accuracy").is_some());
//! assert!(report.defined("prediction").is_some());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::cast_precision_loss)]

pub mod aggregate;
pub mod compare;
pub mod config;
pub mod error;
pub mod recorder;
pub mod report;
pub mod run;
pub mod sample;
pub mod sink;

pub use error::{Error, Result};
