//! JSON file sink
//!
//! Layout inside the sink directory:
//!
//! - `<run_id>.jsonl` while the run is open: first line is the run
//!   metadata, every following line one sample. Appended at each flush.
//! - `<run_id>.json` once the run is closed: the complete [`Run`]. The
//!   `.jsonl` journal is removed at that point.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{validate_run_id, SampleSink};
use crate::run::{Run, RunMetadata};
use crate::sample::Sample;
use crate::{Error, Result};

/// Sink writing one JSON document per run into a directory.
#[derive(Debug)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    /// Create a sink rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Get the sink directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the closed-run document for `run_id`.
    #[must_use]
    pub fn run_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    fn journal_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.jsonl"))
    }

    /// Load a closed run document.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Run> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Rebuild a run from an open-run journal (e.g. after a crash).
    ///
    /// The run keeps the status it had when the journal was last written.
    /// A partially written last line (crash mid-append) is dropped with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns error if the journal is empty, its header is unreadable, or
    /// a line other than the last cannot be parsed.
    pub fn load_journal<P: AsRef<Path>>(path: P) -> Result<Run> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines();

        let header = lines.next().ok_or_else(|| {
            Error::StorageError(format!("Empty run journal: {}", path.display()))
        })??;
        let metadata: RunMetadata = serde_json::from_str(&header)?;

        let lines: Vec<String> = lines
            .filter(|line| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .collect::<std::io::Result<_>>()?;

        let mut samples = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str::<Sample>(line) {
                Ok(sample) => samples.push(sample),
                Err(e) if i + 1 == lines.len() => {
                    warn!(
                        run_id = metadata.run_id(),
                        path = %path.display(),
                        error = %e,
                        "dropping truncated last journal line"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Run::from_samples(metadata, samples))
    }
}

impl SampleSink for JsonFileSink {
    fn open_run(&mut self, metadata: &RunMetadata) -> Result<()> {
        validate_run_id(metadata.run_id())?;
        let path = self.journal_path(metadata.run_id());
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, metadata)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        debug!(run_id = metadata.run_id(), path = %path.display(), "opened run journal");
        Ok(())
    }

    fn write_batch(&mut self, metadata: &RunMetadata, samples: &[Sample]) -> Result<()> {
        let path = self.journal_path(metadata.run_id());
        let file = OpenOptions::new().append(true).open(&path).map_err(|e| {
            Error::StorageError(format!(
                "Failed to append to run journal {}: {e}",
                path.display()
            ))
        })?;
        let mut writer = BufWriter::new(file);
        for sample in samples {
            serde_json::to_writer(&mut writer, sample)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    fn close_run(&mut self, run: &Run) -> Result<()> {
        validate_run_id(run.run_id())?;
        let path = self.run_path(run.run_id());
        let json = serde_json::to_string_pretty(run)?;
        fs::write(&path, json)?;

        let journal = self.journal_path(run.run_id());
        if journal.exists() {
            fs::remove_file(&journal)?;
        }
        info!(run_id = run.run_id(), samples = run.len(), path = %path.display(), "wrote run archive");
        Ok(())
    }
}
