//! Aggregated report - derived metrics of one run
//!
//! A report maps metric names to [`MetricEntry`] values. Derived entries
//! use suffixed names next to their source metric:
//!
//! | entry name                 | produced for                |
//! |----------------------------|-----------------------------|
//! | `<metric>`                 | every metric                |
//! | `<metric>.series`          | accuracy and loss metrics   |
//! | `<metric>.time_to_accuracy`| accuracy metrics            |
//! | `<metric>.confusion`       | predictions mixed with scalars under one name |
//! | `stage_time.<stage>`       | stages timed by the recorder|
//! | `run.wall_time`            | closed runs                 |
//!
//! Entries that could not be computed are kept as
//! [`MetricEntry::Undefined`]; metrics that never appeared have no entry.
//! Both read as undefined through [`AggregatedReport::defined`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::{
    ClassificationReport, LatencyStats, SeriesPoint, SummaryStats, TimeToAccuracy,
};
use crate::run::{RunMetadata, RunStatus};
use crate::Result;

/// One derived metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricEntry {
    /// A single computed value
    Scalar {
        /// The value
        value: f64,
    },
    /// Min/max/mean of a scalar metric
    Summary(SummaryStats),
    /// Metric curve over elapsed time
    Series {
        /// Points ordered by time
        points: Vec<SeriesPoint>,
    },
    /// Time until the rolling accuracy reached the threshold
    TimeToAccuracy(TimeToAccuracy),
    /// Confusion matrix with precision/recall/F1
    Classification(ClassificationReport),
    /// Latency percentiles and throughput
    Latency(LatencyStats),
    /// Could not be computed from the available samples
    Undefined {
        /// Why the metric is undefined
        reason: String,
    },
}

impl MetricEntry {
    /// Build an undefined entry.
    #[must_use]
    pub fn undefined(reason: impl Into<String>) -> Self {
        Self::Undefined {
            reason: reason.into(),
        }
    }

    /// Whether this entry holds a computed value.
    #[must_use]
    pub const fn is_defined(&self) -> bool {
        !matches!(self, Self::Undefined { .. })
    }

    /// Flatten into named scalar cells. An empty suffix names the entry
    /// itself.
    #[must_use]
    pub fn cells(&self) -> Vec<(&'static str, Cell)> {
        match self {
            Self::Scalar { value } => vec![("", Cell::Value(*value))],
            Self::Summary(s) => vec![
                ("count", Cell::Value(s.count as f64)),
                ("min", Cell::Value(s.min)),
                ("max", Cell::Value(s.max)),
                ("mean", Cell::Value(s.mean)),
            ],
            Self::Series { points } => vec![
                ("points", Cell::Value(points.len() as f64)),
                ("final", points.last().map_or(Cell::Undefined, |p| Cell::Value(p.value))),
            ],
            Self::TimeToAccuracy(tta) => vec![(
                "",
                tta.elapsed_secs().map_or(Cell::NotReached, Cell::Value),
            )],
            Self::Classification(c) => vec![
                ("samples", Cell::Value(c.matrix.total() as f64)),
                ("accuracy", Cell::Value(c.accuracy)),
                ("macro_precision", Cell::Value(c.macro_precision)),
                ("macro_recall", Cell::Value(c.macro_recall)),
                ("macro_f1", Cell::Value(c.macro_f1)),
            ],
            Self::Latency(l) => vec![
                ("count", Cell::Value(l.count as f64)),
                ("p50", Cell::Value(l.p50)),
                ("p95", Cell::Value(l.p95)),
                ("p99", Cell::Value(l.p99)),
                ("mean", Cell::Value(l.mean)),
                ("throughput", l.throughput.map_or(Cell::Undefined, Cell::Value)),
            ],
            Self::Undefined { .. } => vec![("", Cell::Undefined)],
        }
    }
}

/// A flattened scalar in reports and comparison tables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    /// Computed value
    Value(f64),
    /// Time-to-accuracy threshold never reached
    NotReached,
    /// Metric present but not computable
    Undefined,
    /// Metric absent from this run but present in others
    NotAvailable,
}

impl Cell {
    /// The numeric value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{v:.0}"),
            Self::Value(v) => write!(f, "{v:.4}"),
            Self::NotReached => f.write_str("not reached"),
            Self::Undefined => f.write_str("undefined"),
            Self::NotAvailable => f.write_str("N/A"),
        }
    }
}

/// Whether `name` is one of `prefixes` or a derived name below one of them
/// (`accuracy` selects `accuracy.series`). An empty list selects everything.
#[must_use]
pub fn metric_matches(name: &str, prefixes: &[String]) -> bool {
    prefixes.is_empty()
        || prefixes.iter().any(|p| {
            name == p
                || name
                    .strip_prefix(p.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
}

/// Derived metrics of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedReport {
    run_id: String,
    tool: String,
    pipeline: String,
    status: RunStatus,
    entries: BTreeMap<String, MetricEntry>,
}

impl AggregatedReport {
    /// Create an empty report for a run.
    #[must_use]
    pub fn new(metadata: &RunMetadata) -> Self {
        Self {
            run_id: metadata.run_id().to_string(),
            tool: metadata.tool().to_string(),
            pipeline: metadata.pipeline().to_string(),
            status: metadata.status(),
            entries: BTreeMap::new(),
        }
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

    /// Status of the run when it was aggregated.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, name: impl Into<String>, entry: MetricEntry) {
        self.entries.insert(name.into(), entry);
    }

    /// Get an entry by name (defined or not).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetricEntry> {
        self.entries.get(name)
    }

    /// Get an entry only if it holds a computed value.
    #[must_use]
    pub fn defined(&self, name: &str) -> Option<&MetricEntry> {
        self.get(name).filter(|e| e.is_defined())
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over `(name, entry)` pairs in sorted order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &MetricEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the report has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only entries selected by [`metric_matches`].
    #[must_use]
    pub fn retain_metrics(mut self, prefixes: &[String]) -> Self {
        self.entries.retain(|name, _| metric_matches(name, prefixes));
        self
    }

    /// Whether no entry holds a computed value.
    #[must_use]
    pub fn all_undefined(&self) -> bool {
        self.entries.values().all(|e| !e.is_defined())
    }

    /// Flatten every entry into `(row name, cell)` pairs.
    #[must_use]
    pub fn cells(&self) -> Vec<(String, Cell)> {
        self.entries
            .iter()
            .flat_map(|(name, entry)| {
                entry.cells().into_iter().map(move |(suffix, cell)| {
                    let row = if suffix.is_empty() {
                        name.clone()
                    } else {
                        format!("{name}.{suffix}")
                    };
                    (row, cell)
                })
            })
            .collect()
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        Ok(if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        })
    }
}

impl fmt::Display for AggregatedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run {} ({} / {}, {:?})",
            self.run_id, self.tool, self.pipeline, self.status
        )?;
        let cells = self.cells();
        if cells.is_empty() {
            return writeln!(f, "  (no metrics recorded)");
        }
        let width = cells.iter().map(|(row, _)| row.len()).max().unwrap_or(0);
        for (row, cell) in cells {
            writeln!(f, "  {row:<width$}  {cell}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> AggregatedReport {
        AggregatedReport::new(&RunMetadata::new("run-1", "torch", "mnist"))
    }

    #[test]
    fn test_empty_report() {
        let r = report();
        assert!(r.is_empty());
        assert!(r.all_undefined());
        assert!(r.defined("accuracy").is_none());
        assert!(r.to_string().contains("no metrics recorded"));
    }

    #[test]
    fn test_undefined_entry_reads_as_undefined() {
        let mut r = report();
        r.insert("power", MetricEntry::undefined("no finite values"));
        assert!(r.get("power").is_some());
        assert!(r.defined("power").is_none());
        assert_eq!(r.cells(), vec![("power".to_string(), Cell::Undefined)]);
    }

    #[test]
    fn test_cells_are_suffixed() {
        let mut r = report();
        r.insert(
            "memory",
            MetricEntry::Summary(SummaryStats::from_values([1.0, 3.0]).unwrap()),
        );
        let rows: Vec<String> = r.cells().into_iter().map(|(row, _)| row).collect();
        assert_eq!(rows, vec!["memory.count", "memory.min", "memory.max", "memory.mean"]);
    }

    #[test]
    fn test_json_tagged_by_kind() {
        let mut r = report();
        r.insert("run.wall_time", MetricEntry::Scalar { value: 2.5 });
        let json = r.to_json(false).unwrap();
        assert!(json.contains(r#""kind":"scalar""#));
        let back: AggregatedReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_metric_matches() {
        let selected = vec!["accuracy".to_string()];
        assert!(metric_matches("accuracy", &selected));
        assert!(metric_matches("accuracy.time_to_accuracy", &selected));
        assert!(!metric_matches("accuracy_top5", &selected));
        assert!(metric_matches("anything", &[]));
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(Cell::Value(3.0).to_string(), "3");
        assert_eq!(Cell::Value(0.12346).to_string(), "0.1235");
        assert_eq!(Cell::NotAvailable.to_string(), "N/A");
        assert_eq!(Cell::NotReached.to_string(), "not reached");
    }
}
