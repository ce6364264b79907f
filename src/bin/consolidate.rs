//! Merge every pipe-delimited game file of a directory into one.
//!
//! Usage: consolidate [--input-dir scripts/csv] [--output merged_all_games.csv]

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use game_reconcile::consolidate::{consolidate_files, discover_inputs, DEFAULT_PRIMARY};
use game_reconcile::logging::init_logging;
use game_reconcile::safety::validate_output_path;

#[derive(Parser)]
#[command(name = "consolidate")]
#[command(about = "Merge game CSVs, skipping titles already present for the same year")]
struct Args {
    #[arg(long, default_value = "scripts/csv")]
    input_dir: PathBuf,

    /// Defaults to merged_all_games.csv inside the input directory
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// File kept whole and processed first
    #[arg(long, default_value = DEFAULT_PRIMARY)]
    primary: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging("info");

    if !args.input_dir.is_dir() {
        bail!("Directory {} does not exist", args.input_dir.display());
    }
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input_dir.join("merged_all_games.csv"));

    let inputs = discover_inputs(&args.input_dir, &args.primary, &output)
        .context("Failed to list input directory")?;
    if inputs.is_empty() {
        info!("No CSV files found to merge");
        return Ok(());
    }
    let sources: Vec<&std::path::Path> = inputs.iter().map(PathBuf::as_path).collect();
    validate_output_path(&output, &sources)?;

    info!("Found {} CSV files to merge", inputs.len());
    let report = consolidate_files(&inputs, &args.primary, &output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!("Merged {} rows into {:?}", report.total_rows, output);
    Ok(())
}
