//! Build the flat detected-source catalogs of one injection run.
//!
//! Reads per-patch forced photometry from the artificial-star rerun and writes
//! `output_{filter}_{magstring}.csv` for every configured filter.

use std::path::PathBuf;

use anyhow::{Context, Result};
use artest::pipeline::CsvPatchStore;
use artest::{write_output_catalogs, RunConfig, RunKey};
use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(
    name = "output-catalog",
    about = "Write per-filter detected-source catalogs for an artificial star run",
    long_about = None
)]
struct Args {
    /// Workspace directory holding config.json and the catalog directories
    workdir: PathBuf,

    /// Magnitude string of the run, one magnitude per filter joined by '_'
    magstring: String,

    /// Config file (default: <workdir>/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pipeline store root (default: from config)
    #[arg(long)]
    store_root: Option<PathBuf>,

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
    if let Some(root) = args.store_root {
        config.store_root = Some(root);
    }

    let run_key = RunKey::parse_for_filters(&args.magstring, config.filters.len())
        .context("Invalid magnitude string")?;

    let store = CsvPatchStore::new(config.store_root());
    info!(
        "Building output catalogs for run {} (tract {}) from {}",
        run_key,
        config.tract,
        store.root().display()
    );

    let written = write_output_catalogs(&store, &config, &run_key)
        .with_context(|| format!("Failed to build output catalogs for run {run_key}"))?;
    for (path, summary) in &written {
        println!("{}\t{}\t{}", summary.filter, summary.kept, path.display());
    }
    Ok(())
}
