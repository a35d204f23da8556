//! e2ebench CLI
//!
//! Thin reporting interface over a directory of archived runs, as written
//! by `JsonFileSink` or `ParquetSink`.
//!
//! # Usage
//!
//! ```bash
//! # List archived runs
//! e2ebench list bench-runs/
//!
//! # Report selected metrics of one run
//! e2ebench report bench-runs/ -u run-001 -m accuracy latency --threshold 0.95
//!
//! # Compare every run side by side, as CSV
//! e2ebench compare bench-runs/ --csv
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use e2ebench::aggregate::Aggregator;
use e2ebench::compare::compare;
use e2ebench::config::AggregatorConfig;
use e2ebench::report::AggregatedReport;
use e2ebench::run::Run;
use e2ebench::sample::{Stage, STAGE_TIME};
use e2ebench::sink::archive::load_runs;
use tracing_subscriber::EnvFilter;

/// Benchmark reporting for end-to-end ML pipelines
#[derive(Parser, Debug)]
#[command(name = "e2ebench", version, about)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List archived runs
    List {
        /// Archive directory
        dir: PathBuf,
    },
    /// Aggregate and print one report per selected run
    Report {
        #[command(flatten)]
        select: SelectArgs,
        #[command(flatten)]
        aggregation: AggregationArgs,
        /// Print JSON instead of a text table
        #[arg(long)]
        json: bool,
    },
    /// Compare selected runs side by side
    Compare {
        #[command(flatten)]
        select: SelectArgs,
        #[command(flatten)]
        aggregation: AggregationArgs,
        /// Print JSON instead of a text table
        #[arg(long, conflicts_with = "csv")]
        json: bool,
        /// Print CSV instead of a text table
        #[arg(long)]
        csv: bool,
    },
}

/// Which runs and samples to aggregate.
#[derive(Args, Debug)]
struct SelectArgs {
    /// Archive directory
    dir: PathBuf,
    /// Run IDs (default: all runs)
    #[arg(short = 'u', long = "runs", num_args = 1..)]
    run_ids: Vec<String>,
    /// Metric names (default: all metrics)
    #[arg(short = 'm', long = "metrics", num_args = 1..)]
    metrics: Vec<String>,
    /// Stages (data_prep, train, validate, infer)
    #[arg(short = 's', long = "stages", num_args = 1..)]
    stages: Vec<Stage>,
    /// Sample descriptions
    #[arg(short = 'd', long = "descriptions", num_args = 1..)]
    descriptions: Vec<String>,
}

/// Aggregator settings.
#[derive(Args, Debug)]
struct AggregationArgs {
    /// JSON aggregator configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Time-to-accuracy threshold in [0, 1]
    #[arg(long)]
    threshold: Option<f64>,
    /// Rolling accuracy window in samples
    #[arg(long)]
    window: Option<usize>,
}

impl AggregationArgs {
    fn aggregator(&self) -> anyhow::Result<Aggregator> {
        let mut config = match &self.config {
            Some(path) => AggregatorConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => AggregatorConfig::default(),
        };
        if let Some(threshold) = self.threshold {
            config = config.with_accuracy_threshold(threshold);
        }
        if let Some(window) = self.window {
            config = config.with_accuracy_window(window);
        }
        Ok(Aggregator::new(config)?)
    }
}

impl SelectArgs {
    /// Load runs and apply the run and sample filters.
    ///
    /// `stage_time` samples survive the metric filter so throughput stays
    /// computable.
    fn load(&self) -> anyhow::Result<Vec<Run>> {
        let runs = load_runs(&self.dir)
            .with_context(|| format!("loading runs from {}", self.dir.display()))?;

        let selected: Vec<Run> = runs
            .into_iter()
            .filter(|run| self.run_ids.is_empty() || self.run_ids.iter().any(|id| id == run.run_id()))
            .map(|run| {
                run.retain_samples(|s| {
                    (self.metrics.is_empty()
                        || s.metric_name() == STAGE_TIME
                        || self.metrics.iter().any(|m| m == s.metric_name()))
                        && (self.stages.is_empty() || self.stages.contains(&s.stage()))
                        && (self.descriptions.is_empty()
                            || s.description()
                                .is_some_and(|d| self.descriptions.iter().any(|want| want == d)))
                })
            })
            .collect();

        let timing_selected =
            self.metrics.is_empty() || self.metrics.iter().any(|m| m == STAGE_TIME);
        let has_samples = selected.iter().any(|run| {
            run.samples()
                .iter()
                .any(|s| timing_selected || s.metric_name() != STAGE_TIME)
        });
        if selected.is_empty() || !has_samples {
            bail!("no samples match the given run ids, metrics, stages and descriptions");
        }
        Ok(selected)
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn list(dir: &Path) -> anyhow::Result<()> {
    let runs = load_runs(dir).with_context(|| format!("loading runs from {}", dir.display()))?;
    if runs.is_empty() {
        println!("No runs in {}", dir.display());
        return Ok(());
    }
    for run in &runs {
        let meta = run.metadata();
        println!(
            "{}  {}  {}  {}  {:?}  {} samples{}",
            meta.run_id(),
            meta.started_at().format("%Y-%m-%d %H:%M:%S"),
            meta.tool(),
            meta.pipeline(),
            meta.status(),
            run.len(),
            meta.description()
                .map(|d| format!("  description: {d}"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

fn reports(select: &SelectArgs, aggregation: &AggregationArgs) -> anyhow::Result<Vec<AggregatedReport>> {
    let aggregator = aggregation.aggregator()?;
    Ok(select
        .load()?
        .iter()
        .map(|run| aggregator.aggregate(run).retain_metrics(&select.metrics))
        .collect())
}

fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::List { dir } => list(&dir),
        Command::Report {
            select,
            aggregation,
            json,
        } => {
            for report in reports(&select, &aggregation)? {
                if json {
                    println!("{}", report.to_json(true)?);
                } else {
                    println!("{report}");
                }
            }
            Ok(())
        }
        Command::Compare {
            select,
            aggregation,
            json,
            csv,
        } => {
            let table = compare(&reports(&select, &aggregation)?);
            if json {
                println!("{}", table.to_json(true)?);
            } else if csv {
                print!("{}", table.to_csv()?);
            } else {
                print!("{table}");
            }
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
