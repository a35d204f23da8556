//! Sample Recorder - instruments pipeline stages
//!
//! The recorder owns the active [`Run`] and its sample buffer. Recording is
//! a plain in-memory append; the sink is only called at stage boundaries
//! ([`Recorder::time_stage`]), on [`Recorder::flush`], and at run close.
//!
//! # Example
//!
//! ```rust
//! use e2ebench::recorder::Recorder;
//! use e2ebench::run::{RunMetadata, RunStatus};
//! use e2ebench::sample::Stage;
//!
//! # fn main() -> e2ebench::Result<()> {
//! let mut recorder = Recorder::in_memory();
//! recorder.start_run(RunMetadata::new("run-001", "tensorflow", "fashion-mnist"))?;
//!
//! let images = recorder.time_stage(Stage::DataPrep, || vec![0u8; 784])?;
//! for epoch in 0..3 {
//!     let loss = 1.0 / f64::from(epoch + 1);
//!     recorder.record_now(Stage::Train, "loss", loss)?;
//! }
//!
//! let run = recorder.finish()?;
//! assert_eq!(run.metadata().status(), RunStatus::Completed);
//! assert_eq!(images.len(), 784);
//! # Ok(())
//! # }
//! ```

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::run::{Run, RunMetadata, RunStatus};
use crate::sample::{MetricValue, Sample, Stage, STAGE_TIME};
use crate::sink::{MemorySink, SampleSink};
use crate::{Error, Result};

/// Records samples into the active run and forwards them to a sink.
#[derive(Debug)]
pub struct Recorder<S = MemorySink> {
    sink: S,
    active: Option<Run>,
    flushed: usize,
}

impl Recorder<MemorySink> {
    /// Create a recorder backed by a [`MemorySink`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemorySink::new())
    }
}

impl<S: SampleSink> Recorder<S> {
    /// Create a recorder writing to `sink`.
    #[must_use]
    pub const fn new(sink: S) -> Self {
        Self {
            sink,
            active: None,
            flushed: 0,
        }
    }

    /// Get the sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Get the sink mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the recorder and return the sink.
    #[must_use]
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// The run currently being recorded, if any.
    #[must_use]
    pub const fn active_run(&self) -> Option<&Run> {
        self.active.as_ref()
    }

    /// Number of recorded samples not yet handed to the sink.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.active
            .as_ref()
            .map_or(0, |run| run.len() - self.flushed)
    }

    /// Start a new run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunAlreadyActive`] if a run is still open, or the
    /// sink's error if it cannot open the run.
    pub fn start_run(&mut self, metadata: RunMetadata) -> Result<()> {
        if let Some(run) = &self.active {
            return Err(Error::RunAlreadyActive(run.run_id().to_string()));
        }
        self.sink.open_run(&metadata)?;
        debug!(
            run_id = metadata.run_id(),
            tool = metadata.tool(),
            pipeline = metadata.pipeline(),
            "run started"
        );
        self.active = Some(Run::new(metadata));
        self.flushed = 0;
        Ok(())
    }

    /// Record one measurement into the active run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveRun`] if no run has been started.
    pub fn record(
        &mut self,
        stage: Stage,
        metric_name: impl Into<String>,
        value: impl Into<MetricValue>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.record_sample(Sample::new(stage, metric_name, value, timestamp))
    }

    /// Record one measurement timestamped now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveRun`] if no run has been started.
    pub fn record_now(
        &mut self,
        stage: Stage,
        metric_name: impl Into<String>,
        value: impl Into<MetricValue>,
    ) -> Result<()> {
        self.record(stage, metric_name, value, Utc::now())
    }

    /// Record a fully built sample (e.g. one carrying a description).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveRun`] if no run has been started.
    pub fn record_sample(&mut self, sample: Sample) -> Result<()> {
        let run = self.active.as_mut().ok_or(Error::NoActiveRun)?;
        run.extend(std::iter::once(sample));
        Ok(())
    }

    /// Run `f` and record its wall time in seconds under `metric_name`.
    ///
    /// The closure is not run when no run is active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveRun`] if no run has been started.
    pub fn measure<T, F>(&mut self, stage: Stage, metric_name: impl Into<String>, f: F) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        if self.active.is_none() {
            return Err(Error::NoActiveRun);
        }
        let started = Instant::now();
        let output = f();
        let elapsed = started.elapsed().as_secs_f64();
        self.record_now(stage, metric_name, elapsed)?;
        Ok(output)
    }

    /// Run a whole stage: records its wall time as `stage_time`, then
    /// flushes the buffered samples to the sink.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveRun`] if no run has been started, or the
    /// sink's error if the flush fails.
    pub fn time_stage<T, F>(&mut self, stage: Stage, f: F) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        let output = self.measure(stage, STAGE_TIME, f)?;
        self.flush()?;
        Ok(output)
    }

    /// Hand all buffered samples to the sink.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveRun`] if no run has been started, or the
    /// sink's error.
    pub fn flush(&mut self) -> Result<()> {
        let run = self.active.as_ref().ok_or(Error::NoActiveRun)?;
        let pending = &run.samples()[self.flushed..];
        if pending.is_empty() {
            return Ok(());
        }
        self.sink.write_batch(run.metadata(), pending)?;
        debug!(run_id = run.run_id(), samples = pending.len(), "flushed samples");
        self.flushed = run.len();
        Ok(())
    }

    /// Close the active run normally and return it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveRun`] if no run has been started, or the
    /// sink's error. On a sink error the run stays active.
    pub fn finish(&mut self) -> Result<Run> {
        self.close(RunStatus::Completed)
    }

    /// Stop the active run early. Its report is built from the samples
    /// recorded so far.
    ///
    /// # Errors
    ///
    /// Same as [`Recorder::finish`].
    pub fn abort(&mut self) -> Result<Run> {
        self.close(RunStatus::Aborted)
    }

    fn close(&mut self, status: RunStatus) -> Result<Run> {
        self.flush()?;
        let mut run = self.active.take().ok_or(Error::NoActiveRun)?;
        run.close(status);
        if let Err(e) = self.sink.close_run(&run) {
            run.reopen();
            self.active = Some(run);
            return Err(e);
        }
        debug!(run_id = run.run_id(), ?status, samples = run.len(), "run closed");
        self.flushed = 0;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> Recorder {
        let mut recorder = Recorder::in_memory();
        recorder
            .start_run(RunMetadata::new("run-1", "torch", "mnist"))
            .unwrap();
        recorder
    }

    #[test]
    fn test_record_without_run_fails() {
        let mut recorder = Recorder::in_memory();
        let err = recorder.record_now(Stage::Train, "loss", 0.5).unwrap_err();
        assert!(matches!(err, Error::NoActiveRun));
    }

    #[test]
    fn test_measure_without_run_skips_closure() {
        let mut recorder = Recorder::in_memory();
        let mut called = false;
        let result = recorder.measure(Stage::Train, "time", || called = true);
        assert!(result.is_err());
        assert!(!called);
    }

    #[test]
    fn test_second_start_fails() {
        let mut recorder = started();
        let err = recorder
            .start_run(RunMetadata::new("run-2", "torch", "mnist"))
            .unwrap_err();
        assert!(matches!(err, Error::RunAlreadyActive(id) if id == "run-1"));
    }

    #[test]
    fn test_no_flush_on_record() {
        let mut recorder = started();
        for i in 0..10 {
            recorder.record_now(Stage::Train, "loss", f64::from(i)).unwrap();
        }
        assert_eq!(recorder.sink().batches(), 0);
        assert_eq!(recorder.pending(), 10);
    }

    #[test]
    fn test_time_stage_flushes() {
        let mut recorder = started();
        recorder.record_now(Stage::DataPrep, "memory", 512.0).unwrap();
        let out = recorder.time_stage(Stage::DataPrep, || 7).unwrap();
        assert_eq!(out, 7);
        assert_eq!(recorder.pending(), 0);
        assert_eq!(recorder.sink().batches(), 1);
        assert_eq!(recorder.sink().samples_written(), 2);

        let run = recorder.active_run().unwrap();
        assert_eq!(run.samples()[1].metric_name(), STAGE_TIME);
    }

    #[test]
    fn test_finish_writes_each_sample_once() {
        let mut recorder = started();
        recorder.record_now(Stage::Train, "loss", 1.0).unwrap();
        recorder.flush().unwrap();
        recorder.record_now(Stage::Train, "loss", 0.5).unwrap();
        let run = recorder.finish().unwrap();

        assert_eq!(run.len(), 2);
        assert_eq!(recorder.sink().samples_written(), 2);
        assert_eq!(recorder.sink().runs().len(), 1);
        assert!(recorder.active_run().is_none());
    }

    #[test]
    fn test_abort_keeps_partial_data() {
        let mut recorder = started();
        recorder.record_now(Stage::Train, "loss", 1.0).unwrap();
        let run = recorder.abort().unwrap();
        assert_eq!(run.metadata().status(), RunStatus::Aborted);
        assert_eq!(run.len(), 1);

        // A new run can start after abort
        recorder
            .start_run(RunMetadata::new("run-2", "torch", "mnist"))
            .unwrap();
    }

    #[test]
    fn test_finish_without_run_fails() {
        let mut recorder = Recorder::in_memory();
        assert!(matches!(recorder.finish(), Err(Error::NoActiveRun)));
    }

    /// Accepts batches, refuses to close runs.
    #[derive(Debug, Default)]
    struct ReadOnlyArchive {
        written: usize,
    }

    impl SampleSink for ReadOnlyArchive {
        fn write_batch(&mut self, _metadata: &RunMetadata, samples: &[Sample]) -> Result<()> {
            self.written += samples.len();
            Ok(())
        }

        fn close_run(&mut self, run: &Run) -> Result<()> {
            Err(Error::StorageError(format!("cannot archive '{}'", run.run_id())))
        }
    }

    #[test]
    fn test_failed_close_leaves_run_open() {
        let mut recorder = Recorder::new(ReadOnlyArchive::default());
        recorder
            .start_run(RunMetadata::new("run-1", "torch", "mnist"))
            .unwrap();
        recorder.record_now(Stage::Train, "loss", 1.0).unwrap();

        assert!(matches!(recorder.finish(), Err(Error::StorageError(_))));
        let run = recorder.active_run().unwrap();
        assert_eq!(run.metadata().status(), RunStatus::Running);
        assert!(run.metadata().ended_at().is_none());

        recorder.record_now(Stage::Train, "loss", 0.5).unwrap();
        assert_eq!(recorder.active_run().unwrap().len(), 2);
        assert_eq!(recorder.sink().written, 1);
    }
}
