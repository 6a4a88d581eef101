//! Stackcast CLI Module
//!
//! Command-line interface for planning, running and inspecting walk-forward
//! stacking forecasts.

use clap::{Parser, Subcommand};
use colored::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::{SeriesLoader, TimeSeries};
use crate::forecast::{write_feature_importance, ForecastConfig, StackingForecaster, TestBoundary};
use crate::timeseries::{FeatureExtractor, WindowIndexer};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn fail(s: &str) -> ColoredString   { s.truecolor(235, 110, 110) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn line_box_empty() { line_box(""); }

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_fail(msg: &str) {
    println!("  {} {}", fail("✗"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "stackcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Walk-forward stacking ensembles for multi-step energy forecasting")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Forecast the configured targets and write one JSON file per target
    Run {
        /// Cleaned hourly data file (CSV, JSON, or Parquet)
        #[arg(short, long)]
        data: PathBuf,

        /// Run configuration (JSON); defaults to the built-in energy setup
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory for the per-target JSON files
        #[arg(short, long, default_value = "forecasts")]
        output: PathBuf,

        /// Only run these targets (repeatable)
        #[arg(short, long)]
        target: Vec<String>,

        /// Fit horizon steps in parallel
        #[arg(long)]
        parallel: bool,

        /// Override the number of cross-validation folds
        #[arg(long)]
        folds: Option<usize>,

        /// Directory that relative auxiliary forecast paths resolve against
        #[arg(long)]
        aux_dir: Option<PathBuf>,
    },

    /// Show the window plan a run would use
    Plan {
        /// Cleaned hourly data file
        #[arg(short, long)]
        data: PathBuf,

        /// Run configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List the feature layout of a target
    Features {
        /// Run configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Target name
        #[arg(short, long)]
        target: String,
    },

    /// List the configured targets, or print the configuration as JSON
    Targets {
        /// Run configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the full configuration instead of the summary
        #[arg(long)]
        json: bool,
    },
}

// ─── Loading ───────────────────────────────────────────────────────────────────

pub fn load_config(path: Option<&Path>) -> anyhow::Result<ForecastConfig> {
    let config = match path {
        Some(p) => ForecastConfig::from_json_file(p)?,
        None => ForecastConfig::energy_default(),
    };
    Ok(config)
}

pub fn load_series(path: &Path, config: &ForecastConfig) -> anyhow::Result<TimeSeries> {
    let mut series = SeriesLoader::new(config.time_column.as_str()).load(path)?;
    config.prepare_series(&mut series)?;
    Ok(series)
}

fn describe_boundary(config: &ForecastConfig) -> String {
    match &config.test_start {
        TestBoundary::Index(idx) => format!("row {}", idx),
        TestBoundary::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M").to_string(),
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(
    data_path: &Path,
    config_path: Option<&Path>,
    output: &Path,
    targets: &[String],
    parallel: bool,
    folds: Option<usize>,
    aux_dir: Option<&Path>,
) -> anyhow::Result<()> {
    println!();
    line_box_top();
    line_box_empty();
    line_box_center(&format!("{}", "Stackcast".white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box(&kv("Data   ", &data_path.display().to_string()));
    line_box(&kv(
        "Config ",
        &config_path.map(|p| p.display().to_string()).unwrap_or_else(|| "built-in energy".to_string()),
    ));
    line_box(&kv("Output ", &output.display().to_string()));
    line_box_empty();
    line_box_bottom();

    let mut config = load_config(config_path)?;
    config.select_targets(targets)?;
    if parallel {
        config = config.with_parallel_horizons(true);
    }
    if let Some(k) = folds {
        config = config.with_n_folds(k);
    }
    config.validate()?;

    section("Run");

    step_run("Loading data");
    let start = Instant::now();
    let series = load_series(data_path, &config)?;
    step_done(&format!("{} rows in {:?}", series.len(), start.elapsed()));

    step_run("Planning windows");
    let forecaster = StackingForecaster::new(&series, config)?;
    let plan = forecaster.plan();
    step_done(&format!("{} train, {} test, horizon {}", plan.n_train(), plan.n_test(), plan.horizon));

    let started = Instant::now();
    let outcomes = forecaster.run_all(aux_dir);

    section("Results");
    println!(
        "  {:<16} {:>10} {:>10} {:>10}",
        muted("Target"),
        muted("MAE"),
        muted("RMSE"),
        muted("MAPE %")
    );
    println!("  {}", dim(&"─".repeat(50)));

    let mut failures = 0usize;
    let mut importance = BTreeMap::new();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(record) => {
                let path = record.write_json(output)?;
                if let Some(report) = &outcome.importance {
                    importance.insert(outcome.target.clone(), report.clone());
                }
                println!(
                    "  {:<16} {:>10} {:>10} {:>10}",
                    outcome.target.white(),
                    format!("{}", record.metrics.mae),
                    format!("{}", record.metrics.rmse),
                    format!("{}", record.metrics.mape)
                );
                tracing::debug!(path = %path.display(), "written");
            }
            Err(e) => {
                failures += 1;
                println!("  {:<16} {}", outcome.target.white(), fail(&e.to_string()));
            }
        }
    }

    if !importance.is_empty() {
        let path = write_feature_importance(output, &importance)?;
        tracing::debug!(path = %path.display(), "written");
    }

    println!();
    if failures == 0 {
        step_ok(&format!("{} target(s) in {:.1}s", outcomes.len(), started.elapsed().as_secs_f64()));
    } else {
        step_fail(&format!("{} of {} target(s) failed", failures, outcomes.len()));
    }
    println!();

    if failures == outcomes.len() && !outcomes.is_empty() {
        anyhow::bail!("every target failed");
    }
    Ok(())
}

pub fn cmd_plan(data_path: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    section("Window Plan");

    let config = load_config(config_path)?;
    let series = load_series(data_path, &config)?;
    let boundary = config.resolve_boundary(&series)?;
    let plan = WindowIndexer::new(config.windows.clone())?.plan(series.len(), boundary);

    let at = |idx: Option<&usize>| {
        idx.and_then(|&i| series.timestamp(i))
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    println!("  {:<16} {}", muted("Rows"), series.len());
    println!("  {:<16} {} ({})", muted("Test start"), describe_boundary(&config), boundary);
    println!("  {:<16} {}", muted("Context"), plan.context_length);
    println!("  {:<16} {}", muted("Horizon"), plan.horizon);
    println!("  {:<16} {}", muted("Stride"), config.windows.stride());
    println!();
    println!(
        "  {:<16} {:>6}  {} → {}",
        muted("Train windows"),
        plan.n_train(),
        at(plan.train_starts.first()),
        at(plan.train_starts.last())
    );
    println!(
        "  {:<16} {:>6}  {} → {}",
        muted("Test windows"),
        plan.n_test(),
        at(plan.test_starts.first()),
        at(plan.test_starts.last())
    );
    println!();

    match config.validate_against(&series, plan.n_train()) {
        Ok(()) if plan.n_test() > 0 => step_ok("plan is usable"),
        Ok(()) => step_fail("no test window fits"),
        Err(e) => step_fail(&e.to_string()),
    }
    println!();
    Ok(())
}

pub fn cmd_features(config_path: Option<&Path>, target: &str) -> anyhow::Result<()> {
    section("Features");

    let config = load_config(config_path)?;
    let target = config
        .target(target)
        .ok_or_else(|| anyhow::anyhow!("unknown target '{}'", target))?;

    // A single-row stand-in carrying every column the target needs
    let mut layout = TimeSeries::hourly(chrono::DateTime::<chrono::Utc>::default(), 1)?;
    for col in target.required_columns() {
        layout.insert_column(col, ndarray::Array1::zeros(1))?;
    }
    let extractor = FeatureExtractor::new(
        &layout,
        &target.target_col,
        &target.covariate_columns(),
        config.features.clone(),
    )?;

    println!("  {:<16} {}", muted("Target"), target.target_col);
    println!("  {:<16} {}", muted("Reference"), target.reference_col);
    println!("  {:<16} {}", muted("Features"), extractor.n_features());
    println!();
    for (i, name) in extractor.feature_names().iter().enumerate() {
        println!("  {:>4}  {}", dim(&i.to_string()), name);
    }
    println!();
    Ok(())
}

pub fn cmd_targets(config_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    if json {
        println!("{}", config.to_json_string()?);
        return Ok(());
    }

    section("Targets");
    println!(
        "  {:<16} {:<28} {:>5} {:>6}",
        muted("Name"),
        muted("Column"),
        muted("Covs"),
        muted("Clip")
    );
    println!("  {}", dim(&"─".repeat(56)));
    for t in &config.targets {
        println!(
            "  {:<16} {:<28} {:>5} {:>6}",
            t.name.white(),
            t.target_col,
            t.covariate_columns().len(),
            t.clip_min.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
        );
    }
    println!();
    println!("  {:<16} {}", muted("Base models"), config.base_models.names().join(", "));
    println!("  {:<16} {}", muted("Folds"), config.n_folds);
    println!("  {:<16} {}", muted("Test start"), describe_boundary(&config));
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        let colored = format!("{}", "abc".red());
        assert_eq!(strip_ansi(&colored), "abc");
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "stackcast", "run", "--data", "x.csv", "-t", "solar", "-t", "price", "--folds", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { target, folds, parallel, output, .. } => {
                assert_eq!(target, vec!["solar".to_string(), "price".to_string()]);
                assert_eq!(folds, Some(3));
                assert!(!parallel);
                assert_eq!(output, PathBuf::from("forecasts"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_default_config_loads() {
        let config = load_config(None).unwrap();
        assert_eq!(config.targets.len(), 5);
    }
}
