//! Run Comparator - side-by-side tables across runs and tools
//!
//! Reports are flattened into scalar cells ([`AggregatedReport::cells`])
//! and aligned by row name. A run lacking a row that another run has gets
//! [`Cell::NotAvailable`] (`N/A`); the comparison itself never fails.
//!
//! ```rust
//! use chrono::Utc;
//! use e2ebench::aggregate::aggregate;
//! use e2ebench::compare::compare;
//! use e2ebench::report::Cell;
//! use e2ebench::run::{Run, RunMetadata};
//! use e2ebench::sample::{Sample, Stage};
//!
//! let now = Utc::now();
//! let tf = Run::from_samples(
//!     RunMetadata::new("tf-1", "tensorflow", "mnist"),
//!     vec![
//!         Sample::new(Stage::Train, "memory", 2048.0, now),
//!         Sample::new(Stage::Train, "power", 120.0, now),
//!     ],
//! );
//! let torch = Run::from_samples(
//!     RunMetadata::new("torch-1", "pytorch", "mnist"),
//!     vec![Sample::new(Stage::Train, "memory", 1024.0, now)],
//! );
//!
//! let table = compare(&[aggregate(&tf), aggregate(&torch)]);
//! let power = table.row("power.mean").unwrap();
//! assert_eq!(power.cells, vec![Cell::Value(120.0), Cell::NotAvailable]);
//! assert_eq!(table.missing().len(), 4);
//! ```

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::Aggregator;
use crate::report::{metric_matches, AggregatedReport, Cell};
use crate::run::Run;
use crate::{Error, Result};

/// One compared run (a table column).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonColumn {
    /// Run ID
    pub run_id: String,
    /// Tool name
    pub tool: String,
    /// Pipeline name
    pub pipeline: String,
}

/// One aligned metric (a table row). `cells[i]` belongs to column `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    /// Flattened metric name, e.g. `latency.p95`
    pub metric: String,
    /// One cell per column
    pub cells: Vec<Cell>,
}

/// A metric present in some runs but missing from this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingMetric {
    /// Flattened metric name
    pub metric: String,
    /// Run lacking it
    pub run_id: String,
}

/// Side-by-side comparison of several runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    columns: Vec<ComparisonColumn>,
    rows: Vec<ComparisonRow>,
}

/// Align reports by metric name.
///
/// Rows appear in first-appearance order across the reports; columns keep
/// the order of `reports`.
#[must_use]
pub fn compare(reports: &[AggregatedReport]) -> Comparison {
    let columns: Vec<ComparisonColumn> = reports
        .iter()
        .map(|r| ComparisonColumn {
            run_id: r.run_id().to_string(),
            tool: r.tool().to_string(),
            pipeline: r.pipeline().to_string(),
        })
        .collect();

    let mut index: FxHashMap<String, usize> = FxHashMap::default();
    let mut rows: Vec<ComparisonRow> = Vec::new();

    for (col, report) in reports.iter().enumerate() {
        for (metric, cell) in report.cells() {
            let slot = match index.get(&metric) {
                Some(&slot) => slot,
                None => {
                    index.insert(metric.clone(), rows.len());
                    rows.push(ComparisonRow {
                        metric,
                        cells: vec![Cell::NotAvailable; reports.len()],
                    });
                    rows.len() - 1
                }
            };
            rows[slot].cells[col] = cell;
        }
    }

    let comparison = Comparison { columns, rows };
    let missing = comparison.missing().len();
    if missing > 0 {
        debug!(missing, "metrics missing from some runs, reported as N/A");
    }
    comparison
}

/// Aggregates runs and compares the resulting reports.
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    aggregator: Aggregator,
}

impl Comparator {
    /// Create a comparator using `aggregator` for every run.
    #[must_use]
    pub const fn new(aggregator: Aggregator) -> Self {
        Self { aggregator }
    }

    /// Aggregate each run, then compare.
    #[must_use]
    pub fn compare_runs(&self, runs: &[Run]) -> Comparison {
        let reports: Vec<AggregatedReport> =
            runs.iter().map(|run| self.aggregator.aggregate(run)).collect();
        compare(&reports)
    }
}

impl Comparison {
    /// Get the columns (one per run).
    #[must_use]
    pub fn columns(&self) -> &[ComparisonColumn] {
        &self.columns
    }

    /// Get the rows (one per flattened metric).
    #[must_use]
    pub fn rows(&self) -> &[ComparisonRow] {
        &self.rows
    }

    /// Find a row by metric name.
    #[must_use]
    pub fn row(&self, metric: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| r.metric == metric)
    }

    /// Cell for a metric and run, if both exist.
    #[must_use]
    pub fn cell(&self, metric: &str, run_id: &str) -> Option<Cell> {
        let col = self.columns.iter().position(|c| c.run_id == run_id)?;
        self.row(metric).map(|r| r.cells[col])
    }

    /// Every `(metric, run)` pair reported as `N/A`.
    #[must_use]
    pub fn missing(&self) -> Vec<MissingMetric> {
        self.rows
            .iter()
            .flat_map(|row| {
                row.cells
                    .iter()
                    .zip(&self.columns)
                    .filter(|(cell, _)| matches!(cell, Cell::NotAvailable))
                    .map(|(_, col)| MissingMetric {
                        metric: row.metric.clone(),
                        run_id: col.run_id.clone(),
                    })
            })
            .collect()
    }

    /// Keep only rows selected by [`metric_matches`].
    #[must_use]
    pub fn retain_metrics(mut self, prefixes: &[String]) -> Self {
        self.rows.retain(|row| metric_matches(&row.metric, prefixes));
        self
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

    /// Render as CSV: a `metric` column followed by one column per run.
    ///
    /// # Errors
    ///
    /// Returns error if the CSV writer fails.
    pub fn to_csv(&self) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);

        let header = std::iter::once("metric").chain(self.columns.iter().map(|c| c.run_id.as_str()));
        wtr.write_record(header)?;

        for row in &self.rows {
            let cells: Vec<String> = row.cells.iter().map(ToString::to_string).collect();
            wtr.write_record(std::iter::once(row.metric.as_str()).chain(cells.iter().map(String::as_str)))?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| Error::Other(format!("CSV output is not UTF-8: {e}")))
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} ({})", c.run_id, c.tool))
            .collect();
        let rendered: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| r.cells.iter().map(ToString::to_string).collect())
            .collect();

        let metric_width = self
            .rows
            .iter()
            .map(|r| r.metric.len())
            .chain(std::iter::once("metric".len()))
            .max()
            .unwrap_or(0);
        let widths: Vec<usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                rendered
                    .iter()
                    .map(|cells| cells[i].len())
                    .chain(std::iter::once(h.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        write!(f, "{:<metric_width$}", "metric")?;
        for (h, w) in headers.iter().zip(&widths) {
            write!(f, "  {h:>w$}")?;
        }
        writeln!(f)?;
        for (row, cells) in self.rows.iter().zip(&rendered) {
            write!(f, "{:<metric_width$}", row.metric)?;
            for (cell, w) in cells.iter().zip(&widths) {
                write!(f, "  {cell:>w$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::run::RunMetadata;
    use crate::sample::{Sample, Stage};
    use chrono::Utc;

    fn run(id: &str, tool: &str, metrics: &[(&str, f64)]) -> Run {
        let now = Utc::now();
        Run::from_samples(
            RunMetadata::builder(id).tool(tool).pipeline("mnist").started_at(now).build(),
            metrics
                .iter()
                .map(|&(name, v)| Sample::new(Stage::Train, name, v, now))
                .collect(),
        )
    }

    #[test]
    fn test_missing_metric_is_na() {
        let a = aggregate(&run("a", "tf", &[("memory", 1.0), ("power", 2.0)]));
        let b = aggregate(&run("b", "torch", &[("memory", 3.0)]));
        let table = compare(&[a, b]);

        assert_eq!(table.cell("power.max", "b"), Some(Cell::NotAvailable));
        assert_eq!(table.cell("memory.max", "b"), Some(Cell::Value(3.0)));
        assert!(table
            .missing()
            .iter()
            .all(|m| m.run_id == "b" && m.metric.starts_with("power.")));
    }

    #[test]
    fn test_self_comparison_identical() {
        let report = aggregate(&run("a", "tf", &[("memory", 1.0), ("loss", 0.2)]));
        let table = compare(&[report.clone(), report]);
        for row in table.rows() {
            assert_eq!(row.cells[0], row.cells[1], "row {}", row.metric);
        }
        assert!(table.missing().is_empty());
    }

    #[test]
    fn test_empty_input() {
        let table = compare(&[]);
        assert!(table.rows().is_empty());
        assert!(table.columns().is_empty());
    }

    #[test]
    fn test_retain_metrics() {
        let a = aggregate(&run("a", "tf", &[("memory", 1.0), ("memory_peak", 2.0)]));
        let table = compare(&[a]).retain_metrics(&["memory".to_string()]);
        assert!(table.rows().iter().all(|r| r.metric.starts_with("memory.")));
        assert_eq!(table.rows().len(), 4);
    }

    #[test]
    fn test_csv_and_table_rendering() {
        let a = aggregate(&run("a,1", "tf", &[("memory", 1.0)]));
        let b = aggregate(&run("b", "torch", &[]));
        let table = compare(&[a, b]);

        let csv = table.to_csv().unwrap();
        assert!(csv.starts_with("metric,\"a,1\",b\n"));
        assert!(csv.contains("memory.mean,1,N/A"));

        let text = table.to_string();
        assert!(text.contains("a,1 (tf)"));
        assert!(text.contains("N/A"));
    }

    #[test]
    fn test_comparator_aggregates_runs() {
        let comparator = Comparator::default();
        let table = comparator.compare_runs(&[run("a", "tf", &[("memory", 5.0)])]);
        assert_eq!(table.cell("memory.mean", "a"), Some(Cell::Value(5.0)));
    }
}
