//! Fill completion times into an existing merged game file.
//!
//! Usage: enrich --input merged_all_games.csv --output enriched.csv [--average-by-name]

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use game_reconcile::enrich::{
    enrich_table, load_table, save_enriched, DurationSource, EnrichConfig,
};
use game_reconcile::logging::init_logging;
use game_reconcile::normalize::TitleNormalizer;
use game_reconcile::progress::{format_duration, set_log_only};
use game_reconcile::safety::validate_output_path;
use game_reconcile::sources::load_survey;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum NormalizerArg {
    /// Letters and digits only
    Compact,
    /// Lowercase words, punctuation removed
    Words,
    /// Lowercase, nothing removed
    Lowercase,
}

impl From<NormalizerArg> for TitleNormalizer {
    fn from(arg: NormalizerArg) -> Self {
        match arg {
            NormalizerArg::Compact => TitleNormalizer::Compact,
            NormalizerArg::Words => TitleNormalizer::Words,
            NormalizerArg::Lowercase => TitleNormalizer::Lowercase,
        }
    }
}

#[derive(Parser)]
#[command(name = "enrich")]
#[command(about = "Fill completion-time columns of a pipe-delimited game file by title lookup")]
struct Args {
    #[arg(long, short)]
    input: PathBuf,

    /// Completion-time survey
    #[arg(long, default_value = "hltb_dataset.csv")]
    survey: PathBuf,

    #[arg(long, short)]
    output: PathBuf,

    #[arg(long, value_enum, default_value = "compact")]
    normalizer: NormalizerArg,

    /// Average durations over all survey entries sharing the matched name
    #[arg(long)]
    average_by_name: bool,

    /// Write run statistics as JSON
    #[arg(long)]
    stats_json: Option<PathBuf>,

    #[arg(long)]
    log_only: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging("info");
    set_log_only(args.log_only);

    validate_output_path(&args.output, &[args.input.as_path(), args.survey.as_path()])?;
    let start = Instant::now();

    let table = load_table(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let survey = load_survey(&args.survey)
        .with_context(|| format!("Failed to read {}", args.survey.display()))?;
    info!("Loaded {} rows and {} survey records", table.len(), survey.len());

    let config = EnrichConfig {
        normalizer: args.normalizer.into(),
        durations: if args.average_by_name {
            DurationSource::AverageByName
        } else {
            DurationSource::Matched
        },
    };
    let file = args.input.display().to_string();
    let out = enrich_table(&table, &file, &survey, &config)?;

    let written = save_enriched(&args.output, &out)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!("Wrote {} rows to {:?}", written, args.output);

    let json = serde_json::to_string_pretty(&out.stats)?;
    info!("[STATS:enrich]\n{}", json);
    if let Some(path) = &args.stats_json {
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
    }

    info!("Enrichment complete in {}", format_duration(start.elapsed()));
    Ok(())
}
