use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use game_reconcile::aliases::Aliases;
use game_reconcile::logging::init_logging;
use game_reconcile::output::save_merged;
use game_reconcile::pipeline::{load_sources, reconcile, SourcePaths};
use game_reconcile::progress::{format_duration, set_log_only};
use game_reconcile::safety::validate_output_path;

#[derive(Parser)]
#[command(name = "game-reconcile")]
#[command(about = "Merge storefront, critic and completion-time catalogs into one pipe-delimited table")]
struct Args {
    /// Storefront export
    #[arg(long, default_value = "Steam_data.csv")]
    steam: PathBuf,

    /// Critic aggregator export
    #[arg(long, default_value = "OpenCritic_data.csv")]
    opencritic: PathBuf,

    /// Completion-time survey
    #[arg(long, default_value = "hltb_dataset.csv")]
    survey: PathBuf,

    #[arg(long, short, default_value = "merged_games.csv")]
    output: PathBuf,

    /// TOML file with extra genre/platform aliases
    #[arg(long)]
    aliases: Option<PathBuf>,

    /// Write run statistics as JSON
    #[arg(long)]
    stats_json: Option<PathBuf>,

    #[arg(long, default_value = "0")]
    workers: usize,

    /// Hide progress bars and log periodic progress lines instead
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

    validate_output_path(
        &args.output,
        &[
            args.steam.as_path(),
            args.opencritic.as_path(),
            args.survey.as_path(),
        ],
    )?;

    let start = Instant::now();

    let aliases = Aliases::load(args.aliases.as_deref()).context("Failed to load alias file")?;
    let (catalog, survey) = load_sources(SourcePaths {
        storefront: &args.steam,
        critic: &args.opencritic,
        survey: &args.survey,
    })
    .context("Failed to load input catalogs")?;

    let out = reconcile(&catalog, &survey, &aliases).context("Reconciliation failed")?;

    let written = save_merged(&args.output, &out.records)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!("Wrote {} rows to {:?}", written, args.output);

    let mut stats = out.stats;
    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    stats.log_phase("reconcile");
    if let Some(path) = &args.stats_json {
        stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
    }

    info!("Reconciliation complete in {}", format_duration(start.elapsed()));
    Ok(())
}
