//! Parquet sink (Arrow columnar format)
//!
//! **Append-only**: every flush becomes one row group in
//! `<run_id>.parquet`. Run metadata lives next to it in
//! `<run_id>.meta.json`, rewritten at open and at close.
//!
//! Schema:
//!
//! | column         | type    | nullable |
//! |----------------|---------|----------|
//! | `stage`        | Utf8    | no       |
//! | `timestamp_ns` | Int64   | no       |
//! | `metric_name`  | Utf8    | no       |
//! | `value`        | Float64 | yes (predictions) |
//! | `truth`        | UInt64  | yes (scalars)     |
//! | `predicted`    | UInt64  | yes (scalars)     |
//! | `description`  | Utf8    | yes      |

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use tracing::{debug, info};

use super::{validate_run_id, SampleSink};
use crate::run::{Run, RunMetadata};
use crate::sample::{MetricValue, Sample, Stage};
use crate::{Error, Result};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Arrow schema of a sample row group.
#[must_use]
pub fn sample_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("stage", DataType::Utf8, false),
        Field::new("timestamp_ns", DataType::Int64, false),
        Field::new("metric_name", DataType::Utf8, false),
        Field::new("value", DataType::Float64, true),
        Field::new("truth", DataType::UInt64, true),
        Field::new("predicted", DataType::UInt64, true),
        Field::new("description", DataType::Utf8, true),
    ]))
}

/// Sink writing one Parquet file per run into a directory.
pub struct ParquetSink {
    dir: PathBuf,
    schema: SchemaRef,
    writer: Option<(String, ArrowWriter<File>)>,
}

impl ParquetSink {
    /// Create a sink rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            schema: sample_schema(),
            writer: None,
        })
    }

    /// Get the sink directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the sample file for `run_id`.
    #[must_use]
    pub fn run_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.parquet"))
    }

    fn meta_path(&self, run_id: &str) -> PathBuf {
        metadata_path_for(&self.run_path(run_id))
    }

    fn write_metadata(&self, metadata: &RunMetadata) -> Result<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        fs::write(self.meta_path(metadata.run_id()), json)?;
        Ok(())
    }

    /// Load a run from its Parquet file and metadata sidecar.
    ///
    /// # Errors
    ///
    /// Returns error if either file is missing or malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Run> {
        let path = path.as_ref();
        let meta_path = metadata_path_for(path);
        let metadata: RunMetadata = serde_json::from_str(&fs::read_to_string(&meta_path).map_err(
            |e| Error::StorageError(format!("Failed to read run metadata {}: {e}", meta_path.display())),
        )?)?;

        let file = File::open(path).map_err(|e| {
            Error::StorageError(format!("Failed to open Parquet file: {e}"))
        })?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut samples = Vec::new();
        for batch in reader {
            samples.extend(batch_to_samples(&batch?)?);
        }

        Ok(Run::from_samples(metadata, samples))
    }
}

impl SampleSink for ParquetSink {
    fn open_run(&mut self, metadata: &RunMetadata) -> Result<()> {
        validate_run_id(metadata.run_id())?;
        let path = self.run_path(metadata.run_id());
        let file = File::create(&path)?;
        let writer = ArrowWriter::try_new(file, Arc::clone(&self.schema), None)?;
        self.writer = Some((metadata.run_id().to_string(), writer));
        self.write_metadata(metadata)?;
        debug!(run_id = metadata.run_id(), path = %path.display(), "opened parquet run file");
        Ok(())
    }

    fn write_batch(&mut self, metadata: &RunMetadata, samples: &[Sample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let batch = samples_to_batch(&self.schema, samples)?;
        match self.writer.as_mut() {
            Some((run_id, writer)) if run_id == metadata.run_id() => {
                writer.write(&batch)?;
                // One row group per flush
                writer.flush()?;
                Ok(())
            }
            _ => Err(Error::StorageError(format!(
                "No open Parquet file for run '{}'",
                metadata.run_id()
            ))),
        }
    }

    fn close_run(&mut self, run: &Run) -> Result<()> {
        match self.writer.take() {
            Some((run_id, writer)) if run_id == run.run_id() => {
                writer.close()?;
            }
            other => {
                self.writer = other;
                return Err(Error::StorageError(format!(
                    "No open Parquet file for run '{}'",
                    run.run_id()
                )));
            }
        }
        self.write_metadata(run.metadata())?;
        info!(
            run_id = run.run_id(),
            samples = run.len(),
            path = %self.run_path(run.run_id()).display(),
            "wrote run archive"
        );
        Ok(())
    }
}

/// `<dir>/<run_id>.parquet` -> `<dir>/<run_id>.meta.json`
pub(crate) fn metadata_path_for(parquet_path: &Path) -> PathBuf {
    parquet_path.with_extension("meta.json")
}

fn samples_to_batch(schema: &SchemaRef, samples: &[Sample]) -> Result<RecordBatch> {
    let mut stages = Vec::with_capacity(samples.len());
    let mut timestamps = Vec::with_capacity(samples.len());
    let mut names = Vec::with_capacity(samples.len());
    let mut values = Vec::with_capacity(samples.len());
    let mut truths = Vec::with_capacity(samples.len());
    let mut predictions = Vec::with_capacity(samples.len());
    let mut descriptions = Vec::with_capacity(samples.len());

    for sample in samples {
        let ts = sample.timestamp().timestamp_nanos_opt().ok_or_else(|| {
            Error::InvalidInput(format!(
                "timestamp {} is outside the nanosecond range",
                sample.timestamp()
            ))
        })?;
        stages.push(sample.stage().as_str());
        timestamps.push(ts);
        names.push(sample.metric_name());
        descriptions.push(sample.description());
        match sample.value() {
            MetricValue::Scalar(v) => {
                values.push(Some(v));
                truths.push(None);
                predictions.push(None);
            }
            MetricValue::Prediction { truth, predicted } => {
                values.push(None);
                truths.push(Some(truth as u64));
                predictions.push(Some(predicted as u64));
            }
        }
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(stages)),
        Arc::new(Int64Array::from(timestamps)),
        Arc::new(StringArray::from(names)),
        Arc::new(Float64Array::from(values)),
        Arc::new(UInt64Array::from(truths)),
        Arc::new(UInt64Array::from(predictions)),
        Arc::new(StringArray::from(descriptions)),
    ];
    Ok(RecordBatch::try_new(Arc::clone(schema), columns)?)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| {
            Error::StorageError(format!("Parquet sample file has no usable '{name}' column"))
        })
}

fn batch_to_samples(batch: &RecordBatch) -> Result<Vec<Sample>> {
    let stages = column::<StringArray>(batch, "stage")?;
    let timestamps = column::<Int64Array>(batch, "timestamp_ns")?;
    let names = column::<StringArray>(batch, "metric_name")?;
    let values = column::<Float64Array>(batch, "value")?;
    let truths = column::<UInt64Array>(batch, "truth")?;
    let predictions = column::<UInt64Array>(batch, "predicted")?;
    let descriptions = column::<StringArray>(batch, "description")?;

    let mut samples = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let stage: Stage = stages.value(row).parse()?;
        let timestamp = from_nanos(timestamps.value(row))?;
        let value = if values.is_null(row) {
            if truths.is_null(row) || predictions.is_null(row) {
                return Err(Error::StorageError(format!(
                    "Row {row} has neither a scalar value nor a prediction"
                )));
            }
            MetricValue::Prediction {
                truth: to_class(truths.value(row))?,
                predicted: to_class(predictions.value(row))?,
            }
        } else {
            MetricValue::Scalar(values.value(row))
        };

        let mut builder = Sample::builder(stage, names.value(row), value).timestamp(timestamp);
        if !descriptions.is_null(row) {
            builder = builder.description(descriptions.value(row));
        }
        samples.push(builder.build());
    }
    Ok(samples)
}

fn from_nanos(nanos: i64) -> Result<DateTime<Utc>> {
    let secs = nanos.div_euclid(NANOS_PER_SEC);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let subsec = nanos.rem_euclid(NANOS_PER_SEC) as u32;
    DateTime::from_timestamp(secs, subsec)
        .ok_or_else(|| Error::StorageError(format!("Invalid timestamp: {nanos}ns")))
}

fn to_class(raw: u64) -> Result<usize> {
    usize::try_from(raw).map_err(|_| Error::StorageError(format!("Class index {raw} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ParquetSink::open(dir.path()).unwrap();
        let metadata = RunMetadata::new("run-pq", "sklearn", "fashion-mnist");
        let now = Utc::now();

        let first = vec![
            Sample::new(Stage::DataPrep, "memory", 1024.0, now),
            Sample::builder(Stage::Validate, "prediction", MetricValue::Prediction { truth: 3, predicted: 1 })
                .timestamp(now)
                .description("fold 0")
                .build(),
        ];
        let second = vec![Sample::new(Stage::Train, "loss", 0.25, now)];

        sink.open_run(&metadata).unwrap();
        sink.write_batch(&metadata, &first).unwrap();
        sink.write_batch(&metadata, &second).unwrap();

        let mut run = Run::from_samples(metadata, [first, second].concat());
        run.close(crate::run::RunStatus::Completed);
        sink.close_run(&run).unwrap();

        let loaded = ParquetSink::load(sink.run_path("run-pq")).unwrap();
        assert_eq!(loaded, run);
    }

    #[test]
    fn test_write_without_open_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ParquetSink::open(dir.path()).unwrap();
        let metadata = RunMetadata::new("run-x", "t", "p");
        let samples = vec![Sample::new(Stage::Train, "loss", 1.0, Utc::now())];
        assert!(matches!(
            sink.write_batch(&metadata, &samples),
            Err(Error::StorageError(_))
        ));
    }

    #[test]
    fn test_from_nanos_negative() {
        let ts = from_nanos(-1).unwrap();
        assert_eq!(ts.timestamp_nanos_opt(), Some(-1));
    }

    #[test]
    fn test_metadata_path() {
        let p = metadata_path_for(Path::new("/tmp/run-1.parquet"));
        assert_eq!(p, PathBuf::from("/tmp/run-1.meta.json"));
    }
}
