//! Loading of the three input catalogs.
//!
//! The storefront and critic exports are outer-joined on `ID`. Both carry an
//! `OpenCriticTitle` column; the storefront one becomes `steam_oc_title` and
//! the critic one `oc_title`. Individual fields that fail to parse are
//! treated as absent; a missing required column aborts the load.

use chrono::NaiveDate;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{ReconcileError, Result};
use crate::models::{CatalogRecord, SurveyRecord};

// ============================================================================
// Permissive Field Parsing
// ============================================================================

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d", "%d %b, %Y", "%b %d, %Y", "%Y/%m/%d"];

/// Parse a date in any of the formats seen in the exports.
/// Timestamps are cut at `T` first.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    let s = s.split_once('T').map_or(s, |(date, _)| date);
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

pub fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer field. Accepts thousands separators, a trailing `%` and
/// float-formatted integers such as `2018.0`.
pub fn parse_int(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    cleaned
        .parse::<i64>()
        .ok()
        .or_else(|| parse_float(&cleaned).map(|v| v as i64))
}

/// Longest plausible completion time. Anything above is a data-entry error.
pub const MAX_HOURS: f64 = 10_000.0;

/// Duration in hours. A range like `10-12` yields its first bound.
/// Values outside `(0, MAX_HOURS]` are absent.
pub fn parse_hours(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let value = parse_float(s).or_else(|| {
        let (first, _) = s.split_once('-')?;
        parse_float(first)
    })?;
    (value > 0.0 && value <= MAX_HOURS).then_some(value)
}

/// Poll counts, including abbreviated forms such as `1.2K`.
pub fn parse_count(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Some(thousands) = s.strip_suffix(['K', 'k']) {
        return parse_float(thousands).map(|v| (v * 1000.0).round() as i64);
    }
    parse_int(s)
}

pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y" | "1.0"
    )
}

// ============================================================================
// Column Lookup
// ============================================================================

/// Header name → position for one CSV file.
struct Columns {
    file: String,
    positions: FxHashMap<String, usize>,
}

impl Columns {
    fn new(file: &str, headers: &csv::StringRecord) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim_start_matches('\u{feff}').trim().to_string(), i))
            .collect();
        Self {
            file: file.to_string(),
            positions,
        }
    }

    fn require(&self, column: &str) -> Result<usize> {
        self.positions
            .get(column)
            .copied()
            .ok_or_else(|| ReconcileError::missing_column(&self.file, column))
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    /// First of `columns` present in the header.
    fn first_of(&self, columns: &[&str]) -> Option<usize> {
        columns.iter().find_map(|c| self.position(c))
    }
}

/// Trimmed, non-empty cell text.
fn cell(row: &csv::StringRecord, pos: Option<usize>) -> Option<&str> {
    let value = row.get(pos?)?.trim();
    (!value.is_empty()).then_some(value)
}

fn cell_string(row: &csv::StringRecord, pos: Option<usize>) -> Option<String> {
    cell(row, pos).map(str::to_string)
}

fn comma_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader)
}

fn open(path: &Path) -> Result<File> {
    Ok(File::open(path)?)
}

fn label(path: &Path) -> String {
    path.display().to_string()
}

// ============================================================================
// Storefront Export
// ============================================================================

pub fn read_storefront<R: Read>(reader: R, file: &str) -> Result<Vec<CatalogRecord>> {
    let mut csv = comma_reader(reader);
    let cols = Columns::new(file, csv.headers()?);

    let id = cols.require("ID")?;
    let title = cols.position("SteamTitle");
    let oc_title = cols.position("OpenCriticTitle");
    let url = cols.position("SteamURL");
    let release = cols.position("SteamReleaseDate");
    let rating = cols.position("SteamReviewsRating");
    let reviews = cols.position("SteamReviewsNum");
    let percent = cols.position("SteamReviewsPercent");
    let dlc = cols.position("SteamDLC");
    let tags = cols.position("SteamTags");
    let developer = cols.first_of(&["SteamDeveloper(s)", "SteamDeveloper"]);

    let mut records = Vec::new();
    for row in csv.records() {
        let row = row?;
        let Some(record_id) = cell_string(&row, Some(id)) else {
            debug!("{}: skipping row without ID", file);
            continue;
        };
        records.push(CatalogRecord {
            id: record_id,
            steam_title: cell_string(&row, title),
            steam_oc_title: cell_string(&row, oc_title),
            steam_url: cell_string(&row, url),
            steam_release_date: cell(&row, release).and_then(parse_date),
            steam_review_rating: cell_string(&row, rating),
            steam_review_count: cell(&row, reviews).and_then(parse_int),
            steam_review_percent: cell(&row, percent).and_then(parse_int),
            is_dlc: cell(&row, dlc).is_some_and(parse_bool),
            steam_tags: cell_string(&row, tags),
            steam_developer: cell_string(&row, developer),
            ..Default::default()
        });
    }
    Ok(records)
}

pub fn load_storefront(path: &Path) -> Result<Vec<CatalogRecord>> {
    read_storefront(open(path)?, &label(path))
}

// ============================================================================
// Critic Aggregator Export
// ============================================================================

pub fn read_critic<R: Read>(reader: R, file: &str) -> Result<Vec<CatalogRecord>> {
    let mut csv = comma_reader(reader);
    let cols = Columns::new(file, csv.headers()?);

    let id = cols.require("ID")?;
    let title = cols.position("OpenCriticTitle");
    let top_critic = cols.position("TopCriticAverage");
    let critic = cols.position("CriticScore");
    let date = cols.position("Date");
    let genres = cols.position("Genres");
    let platforms = cols.position("Platforms");
    let developer = cols.position("Developers/Publishers");
    let url = cols.position("OpenCriticURL");

    let mut records = Vec::new();
    for row in csv.records() {
        let row = row?;
        let Some(record_id) = cell_string(&row, Some(id)) else {
            debug!("{}: skipping row without ID", file);
            continue;
        };
        let critic_score = cell(&row, top_critic)
            .and_then(parse_float)
            .or_else(|| cell(&row, critic).and_then(parse_float));
        records.push(CatalogRecord {
            id: record_id,
            oc_title: cell_string(&row, title),
            critic_score,
            oc_release_date: cell(&row, date).and_then(parse_date),
            oc_genres: cell_string(&row, genres),
            platforms: cell_string(&row, platforms),
            oc_developer: cell_string(&row, developer),
            opencritic_url: cell_string(&row, url),
            ..Default::default()
        });
    }
    Ok(records)
}

pub fn load_critic(path: &Path) -> Result<Vec<CatalogRecord>> {
    read_critic(open(path)?, &label(path))
}

// ============================================================================
// Outer Join
// ============================================================================

/// Copy the critic-side fields of `critic` into `target`.
fn absorb_critic(target: &mut CatalogRecord, critic: CatalogRecord) {
    target.oc_title = critic.oc_title;
    target.critic_score = critic.critic_score;
    target.oc_release_date = critic.oc_release_date;
    target.oc_genres = critic.oc_genres;
    target.platforms = critic.platforms;
    target.oc_developer = critic.oc_developer;
    target.opencritic_url = critic.opencritic_url;
}

/// Full outer join on `ID`, ordered by identifier.
///
/// Duplicate identifiers within one source keep their first row.
pub fn join_catalogs(
    storefront: Vec<CatalogRecord>,
    critic: Vec<CatalogRecord>,
) -> Vec<CatalogRecord> {
    let mut joined: BTreeMap<String, CatalogRecord> = BTreeMap::new();

    for record in storefront {
        match joined.entry(record.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(_) => warn!("Duplicate storefront ID {}, keeping first row", record.id),
        }
    }

    let mut critic_seen = FxHashSet::default();
    for record in critic {
        if !critic_seen.insert(record.id.clone()) {
            warn!("Duplicate critic ID {}, keeping first row", record.id);
            continue;
        }
        match joined.entry(record.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => absorb_critic(slot.get_mut(), record),
        }
    }

    joined.into_values().collect()
}

// ============================================================================
// Completion-Time Survey
// ============================================================================

pub fn read_survey<R: Read>(reader: R, file: &str) -> Result<Vec<SurveyRecord>> {
    let mut csv = comma_reader(reader);
    let cols = Columns::new(file, csv.headers()?);

    let name = cols.require("name")?;
    let main = cols.position("main_story");
    let extra = cols.position("main_plus_sides");
    let completionist = cols.position("completionist");
    let year = cols.position("release_year");
    let date = cols.position("release_date");
    let polled = cols.position("main_story_polled");
    let genres = cols.position("genres");
    let platforms = cols.position("platforms");
    let url = cols.position("source_url");

    let mut records = Vec::new();
    for row in csv.records() {
        let row = row?;
        records.push(SurveyRecord {
            name: row.get(name).unwrap_or_default().trim().to_string(),
            main_story: cell(&row, main).and_then(parse_hours),
            main_plus_sides: cell(&row, extra).and_then(parse_hours),
            completionist: cell(&row, completionist).and_then(parse_hours),
            release_year: cell(&row, year)
                .and_then(parse_int)
                .filter(|y| *y > 0)
                .and_then(|y| i32::try_from(y).ok()),
            release_date: cell(&row, date).and_then(parse_date),
            popularity: cell(&row, polled).and_then(parse_count).unwrap_or(0),
            genres: cell_string(&row, genres),
            platforms: cell_string(&row, platforms),
            source_url: cell_string(&row, url),
        });
    }
    Ok(records)
}

pub fn load_survey(path: &Path) -> Result<Vec<SurveyRecord>> {
    read_survey(open(path)?, &label(path))
}
