//! Core data models for catalog reconciliation.
//!
//! This module contains the record types flowing through the pipeline and the
//! run statistics written at the end of a reconciliation.

use chrono::NaiveDate;
use serde::Serialize;

// ============================================================================
// Input Models
// ============================================================================

/// One game from the storefront/critic outer join, keyed by `ID`.
///
/// Fields from only one source are `None` when that source has no row for
/// the identifier.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogRecord {
    pub id: String,

    // Titles (`SteamTitle`, `OpenCriticTitle_steam`, `OpenCriticTitle_oc`)
    pub steam_title: Option<String>,
    pub steam_oc_title: Option<String>,
    pub oc_title: Option<String>,

    // Release dates from both sources
    pub steam_release_date: Option<NaiveDate>,
    pub oc_release_date: Option<NaiveDate>,

    // Scores and reviews
    pub critic_score: Option<f64>,
    pub steam_review_rating: Option<String>,
    pub steam_review_count: Option<i64>,
    pub steam_review_percent: Option<i64>,
    pub is_dlc: bool,

    // Links
    pub steam_url: Option<String>,
    pub opencritic_url: Option<String>,

    // Studio / tags / platforms as raw comma-separated text
    pub steam_developer: Option<String>,
    pub oc_developer: Option<String>,
    pub steam_tags: Option<String>,
    pub oc_genres: Option<String>,
    pub platforms: Option<String>,
}

impl CatalogRecord {
    /// Display title: storefront first, then either critic title.
    pub fn display_title(&self) -> Option<&str> {
        self.steam_title
            .as_deref()
            .or(self.oc_title.as_deref())
            .or(self.steam_oc_title.as_deref())
    }

    /// The raw title fields used for lookups, in lookup priority order.
    pub fn lookup_titles(&self) -> [Option<&str>; 3] {
        [
            self.steam_title.as_deref(),
            self.steam_oc_title.as_deref(),
            self.oc_title.as_deref(),
        ]
    }

    /// Years that are plausible release years for this game.
    pub fn reference_years(&self) -> Vec<i32> {
        use chrono::Datelike;
        let mut years: Vec<i32> = [self.steam_release_date, self.oc_release_date]
            .into_iter()
            .flatten()
            .map(|d| d.year())
            .collect();
        years.sort_unstable();
        years.dedup();
        years
    }

    /// Earliest of the two release dates.
    pub fn release_date(&self) -> Option<NaiveDate> {
        match (self.steam_release_date, self.oc_release_date) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Completion-time survey entry. Durations are in hours.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurveyRecord {
    pub name: String,
    pub main_story: Option<f64>,
    pub main_plus_sides: Option<f64>,
    pub completionist: Option<f64>,
    pub release_year: Option<i32>,
    pub release_date: Option<NaiveDate>,
    /// Poll count; used as popularity weight. Missing counts are 0.
    pub popularity: i64,
    pub genres: Option<String>,
    pub platforms: Option<String>,
    pub source_url: Option<String>,
}

impl SurveyRecord {
    /// Known release year: explicit year column, else year of the full date.
    pub fn year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.release_year.or(self.release_date.map(|d| d.year()))
    }

    /// Release date: full date when present, else January 1st of the year.
    pub fn resolved_release_date(&self) -> Option<NaiveDate> {
        self.release_date
            .or_else(|| self.release_year.and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)))
    }
}

// ============================================================================
// Output Models
// ============================================================================

/// Platform entry serialized into the `platforms` JSON column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlatformEntry {
    pub name: String,
    #[serde(rename = "releaseDate")]
    pub release_date: Option<String>,
}

/// Final unified row, one per catalog identifier or synthetic survey identifier.
///
/// `genres` and `platforms` hold pre-serialized JSON text so the sink can pass
/// them straight to JSON-typed columns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergedRecord {
    pub id: String,
    pub title: Option<String>,
    pub release_date: Option<String>,
    pub steam_url: Option<String>,
    pub opencritic_url: Option<String>,
    pub hltb_url: Option<String>,
    pub opencritic_score: Option<i64>,
    pub steam_app_id: Option<String>,
    pub steam_review_score: Option<String>,
    pub steam_review_count: Option<i64>,
    pub steam_review_percent: Option<i64>,
    pub is_dlc: bool,
    pub studio: Option<String>,
    pub genres: Option<String>,
    pub platforms: Option<String>,
    pub hltb_main: Option<i64>,
    pub hltb_extra: Option<i64>,
    pub hltb_completionist: Option<i64>,
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Per-run reconciliation statistics.
#[derive(Default, Debug, Clone, Serialize)]
pub struct ReconcileStats {
    pub catalog_rows: usize,
    pub survey_rows: usize,
    pub indexed_keys: usize,

    // Matching outcomes per catalog row
    pub matched_by_year: usize,
    pub matched_by_missing_year: usize,
    pub matched_by_popularity: usize,
    pub no_candidates: usize,
    pub rejected_far_year: usize,

    // Year distance of accepted year matches
    pub year_distance_0: usize,
    pub year_distance_1: usize,
    pub year_distance_2: usize,

    pub appended_unmatched: usize,
    pub output_rows: usize,

    pub elapsed_seconds: f64,
}

impl ReconcileStats {
    pub fn total_matches(&self) -> usize {
        self.matched_by_year + self.matched_by_missing_year + self.matched_by_popularity
    }

    /// Calculate match rate over catalog rows as a percentage
    pub fn match_rate(&self) -> f64 {
        if self.catalog_rows == 0 {
            0.0
        } else {
            100.0 * self.total_matches() as f64 / self.catalog_rows as f64
        }
    }

    pub fn record_year_distance(&mut self, distance: u32) {
        match distance {
            0 => self.year_distance_0 += 1,
            1 => self.year_distance_1 += 1,
            _ => self.year_distance_2 += 1,
        }
    }

    /// Log stats in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            tracing::info!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
