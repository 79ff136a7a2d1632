//! Crossmatch one injection run and append its statistics to the results table.

use std::path::PathBuf;

use anyhow::{Context, Result};
use artest::results::results_table_path;
use artest::{append_record, run_crossmatch, AppendOutcome, RunConfig, RunKey};
use clap::Parser;
use log::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "crossmatch",
    about = "Match injected stars against detections and record completeness per filter",
    long_about = None
)]
struct Args {
    /// Workspace directory holding config.json, the catalogs and matches.csv
    workdir: PathBuf,

    /// Magnitude string of the run, one magnitude per filter joined by '_'
    magstring: String,

    /// Config file (default: <workdir>/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the maximum match separation in arcseconds
    #[arg(long)]
    max_separation_arcsec: Option<f64>,

    /// Override the maximum |detected - injected| magnitude difference
    #[arg(long)]
    max_mag_offset: Option<f64>,

    /// Results table (default: <workdir>/matches.csv)
    #[arg(long)]
    results: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| args.workdir.join(artest::config::CONFIG_FILE_NAME));
    let mut config = RunConfig::load(&config_path, &args.workdir)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if let Some(sep) = args.max_separation_arcsec {
        config.matching.max_separation_arcsec = sep;
    }
    if let Some(offset) = args.max_mag_offset {
        config.matching.max_mag_offset = offset;
    }
    config.validate().context("Invalid matching overrides")?;

    let run_key = RunKey::parse_for_filters(&args.magstring, config.filters.len())
        .context("Invalid magnitude string")?;

    let record = run_crossmatch(&config, &run_key)
        .with_context(|| format!("Crossmatch failed for run {run_key}"))?;

    let table = args
        .results
        .unwrap_or_else(|| results_table_path(&args.workdir));
    let outcome = append_record(&table, &record)
        .with_context(|| format!("Failed to record run {run_key} in {}", table.display()))?;

    match &outcome {
        AppendOutcome::Created { path } => info!("Created {}", path.display()),
        AppendOutcome::Appended { path, rows } => {
            info!("Appended to {} ({rows} rows)", path.display())
        }
        AppendOutcome::Diverted { legacy, backup, .. } => warn!(
            "{} kept unchanged (backup {}); run recorded in {}",
            legacy.display(),
            backup.display(),
            outcome.table_path().display()
        ),
    }

    for stats in &record.stats {
        println!(
            "{}\t{}\t{}/{}\t{:.4}\t{:.4}",
            stats.filter, stats.mag, stats.matches, stats.total, stats.ratio, stats.ratio_err
        );
    }
    Ok(())
}
