//! Loading archived runs back from a sink directory

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{JsonFileSink, ParquetSink};
use crate::run::Run;
use crate::{Error, Result};

/// Kind of archive file found in a sink directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Json,
    Journal,
    Parquet,
}

fn classify(path: &Path) -> Option<ArchiveKind> {
    let name = path.file_name()?.to_str()?;
    if name.ends_with(".meta.json") {
        None
    } else if name.ends_with(".json") {
        Some(ArchiveKind::Json)
    } else if name.ends_with(".jsonl") {
        Some(ArchiveKind::Journal)
    } else if name.ends_with(".parquet") {
        Some(ArchiveKind::Parquet)
    } else {
        None
    }
}

/// A corrupt archive only loses its own run.
fn skip_unreadable(path: &Path, loaded: Result<Run>) -> Option<Run> {
    match loaded {
        Ok(run) => Some(run),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable run archive");
            None
        }
    }
}

/// Load every run archived in `dir` by [`JsonFileSink`] or [`ParquetSink`].
///
/// Journals of runs that were never closed are recovered as well, unless a
/// closed document for the same run exists. Archives that cannot be read
/// (e.g. the Parquet file of a run that was never closed) are skipped with
/// a warning. Runs are returned ordered by start time, then run ID.
///
/// # Errors
///
/// Returns error if the directory cannot be read.
pub fn load_runs<P: AsRef<Path>>(dir: P) -> Result<Vec<Run>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(Error::StorageError(format!(
            "Run archive directory not found: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.sort();

    let mut runs: Vec<Run> = Vec::new();
    let mut journals = Vec::new();
    for path in paths {
        let loaded = match classify(&path) {
            Some(ArchiveKind::Json) => JsonFileSink::load(&path),
            Some(ArchiveKind::Parquet) => ParquetSink::load(&path),
            Some(ArchiveKind::Journal) => {
                journals.push(path);
                continue;
            }
            None => {
                debug!(path = %path.display(), "skipping non-archive file");
                continue;
            }
        };
        if let Some(run) = skip_unreadable(&path, loaded) {
            runs.push(run);
        }
    }

    for path in journals {
        let Some(run) = skip_unreadable(&path, JsonFileSink::load_journal(&path)) else {
            continue;
        };
        if runs.iter().any(|r| r.run_id() == run.run_id()) {
            continue;
        }
        warn!(run_id = run.run_id(), "recovered unfinished run from journal");
        runs.push(run);
    }

    runs.sort_by(|a, b| {
        a.metadata()
            .started_at()
            .cmp(&b.metadata().started_at())
            .then_with(|| a.run_id().cmp(b.run_id()))
    });
    Ok(runs)
}
