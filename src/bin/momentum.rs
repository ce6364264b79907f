//! Append a franchise/studio momentum column to a merged game file.
//!
//! Usage: momentum --input enriched.csv --output with_momentum.csv --group franchise

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::path::PathBuf;
use tracing::info;

use game_reconcile::logging::init_logging;
use game_reconcile::momentum::{compute_momentum, inputs_from_table, MomentumConfig, Weighting};
use game_reconcile::output::{PipeTable, PipeWriter};
use game_reconcile::progress::set_log_only;
use game_reconcile::safety::validate_output_path;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WeightingArg {
    Temporal,
    Uniform,
}

#[derive(Parser)]
#[command(name = "momentum")]
#[command(about = "Weighted average of a value over records sharing a group key")]
struct Args {
    #[arg(long, short)]
    input: PathBuf,

    #[arg(long, short)]
    output: PathBuf,

    /// Grouping column, e.g. franchise or studio
    #[arg(long, default_value = "franchise")]
    group: String,

    #[arg(long, default_value = "hltbMain")]
    value: String,

    /// Name of the appended column (default: <group>_momentum)
    #[arg(long)]
    column: Option<String>,

    #[arg(long, value_enum, default_value = "temporal")]
    weighting: WeightingArg,

    #[arg(long, default_value = "0.5")]
    decay_rate: f64,

    #[arg(long, default_value = "0.1")]
    min_value: f64,

    #[arg(long, default_value = "2")]
    min_group_size: usize,

    #[arg(long, default_value = "2010")]
    fallback_year: i32,

    #[arg(long, default_value = "0")]
    workers: usize,

    #[arg(long)]
    log_only: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging("info");
    set_log_only(args.log_only);

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    validate_output_path(&args.output, &[args.input.as_path()])?;

    let config = MomentumConfig {
        weighting: match args.weighting {
            WeightingArg::Temporal => Weighting::TemporalDecay {
                rate: args.decay_rate,
            },
            WeightingArg::Uniform => Weighting::Uniform,
        },
        min_value: args.min_value,
        min_group_size: args.min_group_size,
        fallback_year: args.fallback_year,
        ..Default::default()
    };

    let table = PipeTable::load(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let file = args.input.display().to_string();
    let inputs = inputs_from_table(&table, &file, &args.group, &args.value, &config)?;
    let momentum = compute_momentum(&inputs, &config);

    let column = args
        .column
        .clone()
        .unwrap_or_else(|| format!("{}_momentum", args.group));
    let mut header = table.headers.clone();
    header.push(column.clone());

    let mut out = PipeWriter::new(File::create(&args.output)?, &header)?;
    for (row, value) in table.rows.iter().zip(&momentum) {
        let mut fields: Vec<String> = row.iter().map(str::to_string).collect();
        fields.resize(table.headers.len(), String::new());
        fields.push(value.to_string());
        out.write_row(&fields)?;
    }
    let written = out.finish()?;

    let with_value = momentum.iter().filter(|v| **v != config.sentinel).count();
    info!(
        "Wrote {} rows to {:?} ({} with {})",
        written, args.output, with_value, column
    );
    Ok(())
}
