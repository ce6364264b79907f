//! Fill completion times into an existing pipe-delimited game table.
//!
//! Unlike [`crate::pipeline::reconcile`], the table is taken as it is: rows
//! are only de-duplicated by `id`, and the four survey columns are filled in
//! place (added to the header when missing). The row title comes from
//! `title`, else `name`. The year of `releaseDate` drives the same
//! year-aware selection as the full reconciliation.

use chrono::Datelike;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ReconcileError, Result};
use crate::index::SurveyIndex;
use crate::mapper::hours_to_rounded_minutes;
use crate::matcher::{Claims, MatchDecision, MatchQuery, YearAwareMatcher};
use crate::models::SurveyRecord;
use crate::normalize::TitleNormalizer;
use crate::output::{PipeTable, PipeWriter};
use crate::progress::{create_progress_bar, log_progress};
use crate::sources::parse_date;

const PROGRESS_LOG_INTERVAL: u64 = 10_000;

/// Columns written by enrichment, in the order they are appended.
pub const SURVEY_COLUMNS: [&str; 4] = ["hltbMain", "hltbExtra", "hltbCompletionist", "hltbUrl"];

/// Which durations a matched row receives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DurationSource {
    /// The matched survey record's own durations.
    #[default]
    Matched,
    /// Mean of the positive durations of every survey record sharing the
    /// matched record's normalized name.
    AverageByName,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichConfig {
    pub normalizer: TitleNormalizer,
    pub durations: DurationSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichStats {
    pub rows_read: usize,
    pub duplicate_ids: usize,
    pub rows_written: usize,
    pub matched: usize,
    pub no_candidates: usize,
    pub rejected_far_year: usize,
    /// Duration cells written (up to three per matched row).
    pub durations_filled: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EnrichOutput {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub stats: EnrichStats,
}

/// Rewrite the unquoted `Xbox Series X|S` platform spelling, which would
/// otherwise split a cell in two.
pub fn sanitize_platform_pipes(text: &str) -> String {
    text.replace("X|S", "X/S")
}

/// Load a pipe table, repairing platform pipes first.
pub fn load_table(path: &Path) -> Result<PipeTable> {
    let text = std::fs::read_to_string(path)?;
    PipeTable::read(sanitize_platform_pipes(&text).as_bytes())
}

fn ensure_column(headers: &mut Vec<String>, name: &str) -> usize {
    if let Some(pos) = headers.iter().position(|h| h == name) {
        return pos;
    }
    headers.push(name.to_string());
    headers.len() - 1
}

type Durations = [Option<f64>; 3];

fn durations(record: &SurveyRecord) -> Durations {
    [record.main_story, record.main_plus_sides, record.completionist]
}

/// Per normalized name, the mean of each positive duration.
pub fn average_by_name(
    survey: &[SurveyRecord],
    normalizer: TitleNormalizer,
) -> FxHashMap<String, Durations> {
    let mut sums: FxHashMap<String, [(f64, u32); 3]> = FxHashMap::default();
    for record in survey {
        let key = normalizer.normalize(&record.name);
        if key.is_empty() {
            continue;
        }
        let entry = sums.entry(key).or_default();
        for (slot, hours) in entry.iter_mut().zip(durations(record)) {
            if let Some(h) = hours.filter(|h| *h > 0.0) {
                slot.0 += h;
                slot.1 += 1;
            }
        }
    }
    sums.into_iter()
        .map(|(key, slots)| {
            let means = slots.map(|(sum, n)| (n > 0).then(|| sum / f64::from(n)));
            (key, means)
        })
        .collect()
}

/// Enrich every row of `table` from `survey`.
///
/// Rows repeating an earlier `id` are dropped. Rows without an `id` are
/// always kept. Existing cells are only replaced when the survey has a value.
pub fn enrich_table(
    table: &PipeTable,
    file: &str,
    survey: &[SurveyRecord],
    config: &EnrichConfig,
) -> Result<EnrichOutput> {
    let title_col = table
        .column("title")
        .or_else(|| table.column("name"))
        .ok_or_else(|| ReconcileError::missing_column(file, "title"))?;
    let id_col = table.column("id");
    let date_col = table.column("releaseDate");

    let mut headers = table.headers.clone();
    let [main_col, extra_col, completionist_col, url_col] =
        SURVEY_COLUMNS.map(|name| ensure_column(&mut headers, name));
    let duration_cols = [main_col, extra_col, completionist_col];

    let index = SurveyIndex::build_with(survey, config.normalizer);
    let matcher = YearAwareMatcher::new(&index, survey);
    let averages = match config.durations {
        DurationSource::AverageByName => average_by_name(survey, config.normalizer),
        DurationSource::Matched => FxHashMap::default(),
    };

    let mut stats = EnrichStats {
        rows_read: table.len(),
        ..Default::default()
    };
    let mut seen_ids: FxHashSet<&str> = FxHashSet::default();
    let mut claims = Claims::new();
    let mut rows = Vec::with_capacity(table.len());

    let total = table.len() as u64;
    let pb = create_progress_bar(total, "Enriching rows");

    for (i, row) in table.rows.iter().enumerate() {
        pb.inc(1);
        log_progress("Enriching", i as u64 + 1, total, PROGRESS_LOG_INTERVAL);

        if let Some(id) = PipeTable::cell(row, id_col) {
            if !seen_ids.insert(id) {
                stats.duplicate_ids += 1;
                debug!("Dropping duplicate id {}", id);
                continue;
            }
        }

        let mut fields: Vec<String> = row.iter().map(str::to_string).collect();
        fields.resize(headers.len(), String::new());

        let years: Vec<i32> = PipeTable::cell(row, date_col)
            .and_then(parse_date)
            .map(|d| d.year())
            .into_iter()
            .collect();
        let title = PipeTable::cell(row, Some(title_col));
        let query = MatchQuery::from_titles(&[title], years, config.normalizer);
        let (decision, updated) = matcher.select(&query, claims);
        claims = updated;

        match decision {
            MatchDecision::Matched { survey_idx, .. } => {
                stats.matched += 1;
                let record = &survey[survey_idx];
                let hours = match config.durations {
                    DurationSource::Matched => durations(record),
                    DurationSource::AverageByName => averages
                        .get(&config.normalizer.normalize(&record.name))
                        .copied()
                        .unwrap_or_default(),
                };
                for (&col, h) in duration_cols.iter().zip(hours) {
                    if let Some(minutes) = hours_to_rounded_minutes(h) {
                        fields[col] = minutes.to_string();
                        stats.durations_filled += 1;
                    }
                }
                if let Some(url) = &record.source_url {
                    fields[url_col] = url.clone();
                }
            }
            MatchDecision::NoCandidates => stats.no_candidates += 1,
            MatchDecision::Rejected { .. } => stats.rejected_far_year += 1,
        }
        rows.push(fields);
    }

    stats.rows_written = rows.len();
    pb.finish_with_message(format!("Enriched {} of {} rows", stats.matched, stats.rows_written));
    info!(
        "Enrichment: {} rows, {} duplicate ids dropped, {} matched",
        stats.rows_written, stats.duplicate_ids, stats.matched
    );

    Ok(EnrichOutput { headers, rows, stats })
}

pub fn write_enriched<W: Write>(writer: W, output: &EnrichOutput) -> Result<usize> {
    let mut out = PipeWriter::new(writer, &output.headers)?;
    for row in &output.rows {
        out.write_row(row)?;
    }
    out.finish()
}

pub fn save_enriched(path: &Path, output: &EnrichOutput) -> Result<usize> {
    write_enriched(File::create(path)?, output)
}
