//! Sample sinks: where recorded samples go between stages and at run close
//!
//! The [`Recorder`](crate::recorder::Recorder) never touches storage on the
//! hot path. It buffers samples in memory and hands them to a
//! [`SampleSink`] only at stage boundaries, on explicit flush, and when the
//! run is closed.
//!
//! ```text
//! record() ──> in-memory buffer ──flush()──> SampleSink::write_batch
//!                                 finish()─> SampleSink::close_run
//! ```
//!
//! # Example
//!
//! ```rust
//! use e2ebench::recorder::Recorder;
//! use e2ebench::run::RunMetadata;
//! use e2ebench::sample::Stage;
//! use e2ebench::sink::MemorySink;
//!
//! # fn main() -> e2ebench::Result<()> {
//! let mut recorder = Recorder::new(MemorySink::new());
//! recorder.start_run(RunMetadata::new("run-001", "tensorflow", "mnist"))?;
//! recorder.record_now(Stage::Train, "loss", 0.42)?;
//! let run = recorder.finish()?;
//!
//! assert_eq!(recorder.sink().runs().len(), 1);
//! assert_eq!(run.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod archive;
mod json;
mod memory;
mod parquet_file;

pub use json::JsonFileSink;
pub use memory::MemorySink;
pub use parquet_file::{sample_schema, ParquetSink};

use crate::run::{Run, RunMetadata};
use crate::sample::Sample;
use crate::{Error, Result};

/// Destination for recorded samples.
///
/// Calls arrive in order: `open_run`, any number of `write_batch`, then
/// `close_run` with the complete run. Each sample is passed to
/// `write_batch` exactly once.
pub trait SampleSink {
    /// A new run was started.
    ///
    /// # Errors
    ///
    /// Returns error if the sink cannot prepare storage for the run.
    fn open_run(&mut self, _metadata: &RunMetadata) -> Result<()> {
        Ok(())
    }

    /// Persist a batch of newly recorded samples.
    ///
    /// # Errors
    ///
    /// Returns error if the batch cannot be written.
    fn write_batch(&mut self, metadata: &RunMetadata, samples: &[Sample]) -> Result<()>;

    /// The run was closed (completed or aborted). `run` holds every sample.
    ///
    /// # Errors
    ///
    /// Returns error if the run cannot be finalized.
    fn close_run(&mut self, run: &Run) -> Result<()>;
}

impl<S: SampleSink + ?Sized> SampleSink for Box<S> {
    fn open_run(&mut self, metadata: &RunMetadata) -> Result<()> {
        (**self).open_run(metadata)
    }

    fn write_batch(&mut self, metadata: &RunMetadata, samples: &[Sample]) -> Result<()> {
        (**self).write_batch(metadata, samples)
    }

    fn close_run(&mut self, run: &Run) -> Result<()> {
        (**self).close_run(run)
    }
}

/// Run IDs become file names in the file-backed sinks. IDs ending in
/// `.meta` would collide with Parquet metadata sidecars.
pub(crate) fn validate_run_id(run_id: &str) -> Result<()> {
    if run_id.is_empty()
        || run_id == "."
        || run_id == ".."
        || run_id.contains(['/', '\\', '\0'])
        || run_id.ends_with(".meta")
    {
        return Err(Error::InvalidInput(format!(
            "run id '{run_id}' cannot be used as a file name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_run_id() {
        assert!(validate_run_id("run-001").is_ok());
        assert!(validate_run_id("").is_err());
        assert!(validate_run_id("../etc").is_err());
        assert!(validate_run_id("..").is_err());
        assert!(validate_run_id("resnet.meta").is_err());
        assert!(validate_run_id("resnet.metadata").is_ok());
    }
}
