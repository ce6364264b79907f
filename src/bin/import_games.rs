//! Reload the `Game` table from a merged pipe-delimited file.
//!
//! Usage: import-games [--input merged_games.csv] --database <url>

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

use game_reconcile::logging::init_logging;
use game_reconcile::progress::{format_duration, set_log_only};
use game_reconcile::sink::{database_path, import_file, open_database};

#[derive(Parser)]
#[command(name = "import-games")]
#[command(about = "Truncate and reload the Game table from a merged CSV")]
struct Args {
    #[arg(long, short, default_value = "merged_games.csv")]
    input: PathBuf,

    /// SQLite database, plain path or sqlite:// URL
    #[arg(long, env = "DATABASE_URL")]
    database: String,

    #[arg(long)]
    log_only: bool,
}

fn run(args: &Args) -> Result<usize> {
    let db_path = database_path(&args.database);
    info!("Opening database: {:?}", db_path);
    let mut conn = open_database(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    info!("Reading merged CSV from {:?}", args.input);
    let (inserted, _) = import_file(&mut conn, &args.input).context("Import failed, rolled back")?;
    Ok(inserted)
}

fn main() {
    let args = Args::parse();
    init_logging("info");
    set_log_only(args.log_only);

    let start = Instant::now();
    match run(&args) {
        Ok(inserted) => info!(
            "Import completed: {} games in {}",
            inserted,
            format_duration(start.elapsed())
        ),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
