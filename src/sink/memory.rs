//! In-memory sink. Data is lost on process exit.

use super::SampleSink;
use crate::run::{Run, RunMetadata};
use crate::sample::Sample;
use crate::Result;

/// Sink that keeps closed runs in memory.
///
/// Useful for tests and for pipelines that aggregate in-process without
/// persisting anything.
#[derive(Debug, Default)]
pub struct MemorySink {
    runs: Vec<Run>,
    batches: usize,
    samples_written: usize,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closed runs, in closing order.
    #[must_use]
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Number of `write_batch` calls received.
    #[must_use]
    pub const fn batches(&self) -> usize {
        self.batches
    }

    /// Total samples received through `write_batch`.
    #[must_use]
    pub const fn samples_written(&self) -> usize {
        self.samples_written
    }

    /// Take ownership of the closed runs, leaving the sink empty.
    pub fn take_runs(&mut self) -> Vec<Run> {
        std::mem::take(&mut self.runs)
    }
}

impl SampleSink for MemorySink {
    fn write_batch(&mut self, _metadata: &RunMetadata, samples: &[Sample]) -> Result<()> {
        self.batches += 1;
        self.samples_written += samples.len();
        Ok(())
    }

    fn close_run(&mut self, run: &Run) -> Result<()> {
        self.runs.push(run.clone());
        Ok(())
    }
}
