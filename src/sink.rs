//! Truncate-and-reload of the `Game` table from a merged pipe CSV.
//!
//! The whole load runs in one transaction: the existing rows are deleted
//! (dependent tables follow through `ON DELETE CASCADE`) and every row is
//! inserted again. Any error drops the transaction, which rolls it back.

use rusqlite::{params, Connection};
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{ReconcileError, Result};
use crate::output::PipeTable;
use crate::progress::{create_progress_bar, log_progress};
use crate::sources::{parse_bool, parse_int};

const PROGRESS_LOG_INTERVAL: u64 = 10_000;

pub const GAME_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS "Game" (
    "id"                 TEXT PRIMARY KEY,
    "title"              TEXT,
    "steamAppId"         TEXT UNIQUE,
    "steamUrl"           TEXT,
    "opencriticScore"    INTEGER,
    "hltbMain"           INTEGER,
    "hltbExtra"          INTEGER,
    "hltbCompletionist"  INTEGER,
    "releaseDate"        TEXT,
    "genres"             TEXT,
    "platforms"          TEXT,
    "studio"             TEXT,
    "steamReviewScore"   TEXT,
    "steamReviewCount"   INTEGER,
    "steamReviewPercent" INTEGER,
    "isDlc"              INTEGER NOT NULL DEFAULT 0,
    "dataMissing"        INTEGER NOT NULL DEFAULT 0,
    "dataFetched"        INTEGER NOT NULL DEFAULT 0,
    "updatedAt"          TEXT NOT NULL
);
"#;

const INSERT_GAME: &str = r#"
INSERT INTO "Game" (
    "id", "title", "steamAppId", "steamUrl", "opencriticScore",
    "hltbMain", "hltbExtra", "hltbCompletionist",
    "releaseDate", "genres", "platforms", "studio",
    "steamReviewScore", "steamReviewCount", "steamReviewPercent", "isDlc",
    "dataMissing", "dataFetched", "updatedAt"
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
"#;

/// One `Game` row as read back from the merged file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameRow {
    pub id: String,
    pub title: Option<String>,
    pub steam_app_id: Option<String>,
    pub steam_url: Option<String>,
    pub opencritic_score: Option<i64>,
    pub hltb_main: Option<i64>,
    pub hltb_extra: Option<i64>,
    pub hltb_completionist: Option<i64>,
    pub release_date: Option<String>,
    pub genres: Option<String>,
    pub platforms: Option<String>,
    pub studio: Option<String>,
    pub steam_review_score: Option<String>,
    pub steam_review_count: Option<i64>,
    pub steam_review_percent: Option<i64>,
    pub is_dlc: bool,
}

/// Rows dropped before loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupeReport {
    pub duplicate_ids: usize,
    pub duplicate_app_ids: usize,
}

/// Convert a merged table into rows. The `id` column is required.
pub fn game_rows(table: &PipeTable, file: &str) -> Result<Vec<GameRow>> {
    let id = table
        .column("id")
        .ok_or_else(|| ReconcileError::missing_column(file, "id"))?;
    let col = |name: &str| table.column(name);
    let (title, app_id, steam_url, score) = (
        col("title"),
        col("steamAppId"),
        col("steamUrl"),
        col("opencriticScore"),
    );
    let (main, extra, completionist) = (col("hltbMain"), col("hltbExtra"), col("hltbCompletionist"));
    let (release, genres, platforms, studio) = (
        col("releaseDate"),
        col("genres"),
        col("platforms"),
        col("studio"),
    );
    let (review_score, review_count, review_percent, dlc) = (
        col("steamReviewScore"),
        col("steamReviewCount"),
        col("steamReviewPercent"),
        col("isDlc"),
    );

    let text = |row: &csv::StringRecord, pos| PipeTable::cell(row, pos).map(str::to_string);
    let int = |row: &csv::StringRecord, pos| PipeTable::cell(row, pos).and_then(parse_int);

    let mut rows = Vec::with_capacity(table.len());
    for row in &table.rows {
        let Some(row_id) = PipeTable::cell(row, Some(id)) else {
            warn!("{}: skipping row without id", file);
            continue;
        };
        rows.push(GameRow {
            id: row_id.to_string(),
            title: text(row, title),
            steam_app_id: text(row, app_id),
            steam_url: text(row, steam_url),
            opencritic_score: int(row, score),
            hltb_main: int(row, main),
            hltb_extra: int(row, extra),
            hltb_completionist: int(row, completionist),
            release_date: text(row, release),
            genres: text(row, genres),
            platforms: text(row, platforms),
            studio: text(row, studio),
            steam_review_score: text(row, review_score),
            steam_review_count: int(row, review_count),
            steam_review_percent: int(row, review_percent),
            is_dlc: PipeTable::cell(row, dlc).is_some_and(parse_bool),
        });
    }
    Ok(rows)
}

/// Drop repeated `id`s, then repeated non-null `steamAppId`s. First row wins.
pub fn dedupe_rows(rows: Vec<GameRow>) -> (Vec<GameRow>, DedupeReport) {
    let mut report = DedupeReport::default();

    let mut ids = FxHashSet::default();
    let unique_ids: Vec<GameRow> = rows
        .into_iter()
        .filter(|row| {
            let fresh = ids.insert(row.id.clone());
            if !fresh {
                report.duplicate_ids += 1;
            }
            fresh
        })
        .collect();

    let mut app_ids = FxHashSet::default();
    let kept = unique_ids
        .into_iter()
        .filter(|row| match &row.steam_app_id {
            Some(app_id) if !app_ids.insert(app_id.clone()) => {
                report.duplicate_app_ids += 1;
                false
            }
            _ => true,
        })
        .collect();

    (kept, report)
}

/// Database file from a connection string. `sqlite://` and `sqlite:`
/// prefixes are accepted.
pub fn database_path(url: &str) -> PathBuf {
    let trimmed = url.trim();
    let path = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    PathBuf::from(path)
}

/// Open the database with foreign keys enforced and the `Game` table present.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(GAME_SCHEMA)?;
    Ok(conn)
}

/// Timestamp stored in `updatedAt`.
pub fn timestamp_now() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Replace every `Game` row with `rows` in a single transaction.
pub fn reload_games(conn: &mut Connection, rows: &[GameRow], updated_at: &str) -> Result<usize> {
    let tx = conn.transaction()?;

    let removed = tx.execute(r#"DELETE FROM "Game""#, [])?;
    info!("Removed {} existing games", removed);

    let total = rows.len() as u64;
    let pb = create_progress_bar(total, "Inserting games");
    {
        let mut stmt = tx.prepare_cached(INSERT_GAME)?;
        for (i, row) in rows.iter().enumerate() {
            stmt.execute(params![
                row.id,
                row.title,
                row.steam_app_id,
                row.steam_url,
                row.opencritic_score,
                row.hltb_main,
                row.hltb_extra,
                row.hltb_completionist,
                row.release_date,
                row.genres,
                row.platforms,
                row.studio,
                row.steam_review_score,
                row.steam_review_count,
                row.steam_review_percent,
                row.is_dlc,
                false,
                true,
                updated_at,
            ])?;
            pb.inc(1);
            log_progress("Inserting", i as u64 + 1, total, PROGRESS_LOG_INTERVAL);
        }
    }
    tx.commit()?;

    pb.finish_with_message(format!("Inserted {} games", rows.len()));
    Ok(rows.len())
}

/// Read a merged file, de-duplicate it and reload the `Game` table.
pub fn import_file(conn: &mut Connection, input: &Path) -> Result<(usize, DedupeReport)> {
    let table = PipeTable::load(input)?;
    let rows = game_rows(&table, &input.display().to_string())?;
    let (rows, report) = dedupe_rows(rows);
    if report.duplicate_ids > 0 {
        info!("Removing {} duplicate IDs", report.duplicate_ids);
    }
    if report.duplicate_app_ids > 0 {
        info!("Removing {} duplicate steamAppIds", report.duplicate_app_ids);
    }
    let inserted = reload_games(conn, &rows, &timestamp_now())?;
    Ok((inserted, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIBRARY_SCHEMA: &str = r#"
        CREATE TABLE "UserLibrary" (
            "userId" TEXT NOT NULL,
            "gameId" TEXT NOT NULL REFERENCES "Game"("id") ON DELETE CASCADE
        );
    "#;

    fn row(id: &str, app_id: Option<&str>) -> GameRow {
        GameRow {
            id: id.to_string(),
            title: Some(format!("Game {id}")),
            steam_app_id: app_id.map(str::to_string),
            ..Default::default()
        }
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!(r#"SELECT COUNT(*) FROM "{table}""#), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_database_path() {
        assert_eq!(database_path("sqlite:///tmp/games.db"), PathBuf::from("/tmp/games.db"));
        assert_eq!(database_path("sqlite:games.db"), PathBuf::from("games.db"));
        assert_eq!(database_path("data/games.db"), PathBuf::from("data/games.db"));
    }

    #[test]
    fn test_dedupe_by_id_then_app_id() {
        let rows = vec![
            row("1", Some("100")),
            row("1", Some("999")),
            row("2", Some("100")),
            row("3", None),
            row("4", None),
        ];
        let (kept, report) = dedupe_rows(rows);
        let ids: Vec<&str> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "4"]);
        assert_eq!(
            report,
            DedupeReport {
                duplicate_ids: 1,
                duplicate_app_ids: 1
            }
        );
    }

    #[test]
    fn test_game_rows_from_table() {
        let text = "id|title|steamAppId|opencriticScore|hltbMain|isDlc|genres\n\
                    1|Celeste|504230|92|510|false|\"[\"\"Platformer\"\"]\"\n\
                    |No Id||||true|\n\
                    hltb-0|Survey Only|||90|true|\n";
        let table = PipeTable::read(text.as_bytes()).unwrap();
        let rows = game_rows(&table, "merged.csv").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].steam_app_id.as_deref(), Some("504230"));
        assert_eq!(rows[0].opencritic_score, Some(92));
        assert_eq!(rows[0].hltb_main, Some(510));
        assert_eq!(rows[0].genres.as_deref(), Some(r#"["Platformer"]"#));
        assert!(!rows[0].is_dlc);
        assert!(rows[1].is_dlc);
        assert_eq!(rows[1].hltb_extra, None);
    }

    #[test]
    fn test_game_rows_requires_id() {
        let table = PipeTable::read("title\nCeleste\n".as_bytes()).unwrap();
        assert!(matches!(
            game_rows(&table, "merged.csv"),
            Err(ReconcileError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_reload_replaces_rows_and_cascades() {
        let mut conn = open_database(Path::new(":memory:")).unwrap();
        conn.execute_batch(LIBRARY_SCHEMA).unwrap();

        reload_games(&mut conn, &[row("old", None)], "2026-01-01T00:00:00.000Z").unwrap();
        conn.execute(r#"INSERT INTO "UserLibrary" VALUES ('u1', 'old')"#, [])
            .unwrap();
        assert_eq!(count(&conn, "UserLibrary"), 1);

        let inserted = reload_games(
            &mut conn,
            &[row("1", Some("10")), row("2", None)],
            "2026-01-02T00:00:00.000Z",
        )
        .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(count(&conn, "Game"), 2);
        assert_eq!(count(&conn, "UserLibrary"), 0);

        let (fetched, updated): (bool, String) = conn
            .query_row(
                r#"SELECT "dataFetched", "updatedAt" FROM "Game" WHERE "id" = '1'"#,
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert!(fetched);
        assert_eq!(updated, "2026-01-02T00:00:00.000Z");
    }

    #[test]
    fn test_failed_reload_rolls_back() {
        let mut conn = open_database(Path::new(":memory:")).unwrap();
        reload_games(&mut conn, &[row("keep", None)], "2026-01-01T00:00:00.000Z").unwrap();

        // Duplicate primary key fails halfway through the insert loop
        let result = reload_games(
            &mut conn,
            &[row("a", None), row("a", None)],
            "2026-01-02T00:00:00.000Z",
        );
        assert!(matches!(result, Err(ReconcileError::Database(_))));

        let id: String = conn
            .query_row(r#"SELECT "id" FROM "Game""#, [], |r| r.get(0))
            .unwrap();
        assert_eq!(id, "keep");
        assert_eq!(count(&conn, "Game"), 1);
    }
}
