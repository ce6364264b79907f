//! Reconciliation pipeline.
//!
//! Phase 1 indexes the survey, phase 2 walks the catalog in identifier order
//! and claims at most one survey record per row, phase 3 maps every catalog
//! row to the output schema and phase 4 appends the survey records nobody
//! claimed under synthetic identifiers.

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::aliases::Aliases;
use crate::error::{ReconcileError, Result};
use crate::index::SurveyIndex;
use crate::mapper::{map_catalog, map_survey_only};
use crate::matcher::{Claims, MatchDecision, MatchQuery, MatchReason, YearAwareMatcher};
use crate::models::{CatalogRecord, MergedRecord, ReconcileStats, SurveyRecord};
use crate::progress::{create_progress_bar, create_spinner, log_progress};
use crate::sources::{join_catalogs, load_critic, load_storefront, load_survey};

const PROGRESS_LOG_INTERVAL: u64 = 10_000;

/// Merged rows plus the statistics of the run that produced them.
#[derive(Debug, Clone)]
pub struct ReconcileOutput {
    pub records: Vec<MergedRecord>,
    pub stats: ReconcileStats,
}

/// Paths of the three inputs.
#[derive(Debug, Clone, Copy)]
pub struct SourcePaths<'a> {
    pub storefront: &'a Path,
    pub critic: &'a Path,
    pub survey: &'a Path,
}

/// Load and join the catalog exports, then load the survey.
pub fn load_sources(paths: SourcePaths<'_>) -> Result<(Vec<CatalogRecord>, Vec<SurveyRecord>)> {
    let spinner = create_spinner("Loading sources");

    let storefront = load_storefront(paths.storefront)?;
    let critic = load_critic(paths.critic)?;
    info!(
        "Loaded {} storefront rows and {} critic rows",
        storefront.len(),
        critic.len()
    );
    let catalog = join_catalogs(storefront, critic);
    let survey = load_survey(paths.survey)?;

    spinner.finish_with_message(format!(
        "Loaded {} catalog rows and {} survey rows",
        catalog.len(),
        survey.len()
    ));
    Ok((catalog, survey))
}

/// Match a single catalog pass against the survey and return the decision for
/// every row together with the final claims.
fn match_catalog(
    catalog: &[CatalogRecord],
    matcher: &YearAwareMatcher<'_>,
    stats: &mut ReconcileStats,
) -> (Vec<Option<usize>>, Claims) {
    let total = catalog.len() as u64;
    let pb = create_progress_bar(total, "Phase 2: Matching");

    let mut claims = Claims::new();
    let mut matches = Vec::with_capacity(catalog.len());

    for (i, record) in catalog.iter().enumerate() {
        let query = MatchQuery::from_catalog(record);
        let (decision, updated) = matcher.select(&query, claims);
        claims = updated;

        match decision {
            MatchDecision::Matched { reason, .. } => match reason {
                MatchReason::YearDistance(distance) => {
                    stats.matched_by_year += 1;
                    stats.record_year_distance(distance);
                }
                MatchReason::MissingYearFallback => stats.matched_by_missing_year += 1,
                MatchReason::MostPopular => stats.matched_by_popularity += 1,
            },
            MatchDecision::NoCandidates => stats.no_candidates += 1,
            MatchDecision::Rejected { candidate_count, best_distance } => {
                stats.rejected_far_year += 1;
                debug!(
                    "Rejected {} candidates for ID {} (closest year distance {:?})",
                    candidate_count, record.id, best_distance
                );
            }
        }
        matches.push(decision.survey_idx());

        pb.inc(1);
        log_progress("Matching", i as u64 + 1, total, PROGRESS_LOG_INTERVAL);
    }

    pb.finish_with_message(format!("Phase 2: Matched {} catalog rows", claims.len()));
    (matches, claims)
}

/// Run the whole reconciliation in memory.
///
/// `catalog` is expected in ascending identifier order (as produced by
/// [`join_catalogs`]); the order decides which row wins a contested record.
pub fn reconcile(
    catalog: &[CatalogRecord],
    survey: &[SurveyRecord],
    aliases: &Aliases,
) -> Result<ReconcileOutput> {
    let start = Instant::now();
    let mut stats = ReconcileStats {
        catalog_rows: catalog.len(),
        survey_rows: survey.len(),
        ..Default::default()
    };

    // Phase 1
    let spinner = create_spinner("Phase 1: Indexing survey titles");
    let index = SurveyIndex::build(survey);
    stats.indexed_keys = index.key_count();
    spinner.finish_with_message(format!("Phase 1: Indexed {} title keys", index.key_count()));

    // Phase 2
    let matcher = YearAwareMatcher::new(&index, survey);
    let (matches, claims) = match_catalog(catalog, &matcher, &mut stats);

    // Phase 3
    let pb = create_progress_bar(catalog.len() as u64, "Phase 3: Mapping fields");
    let mut records: Vec<MergedRecord> = catalog
        .par_iter()
        .zip(matches.par_iter())
        .map(|(record, matched)| {
            let result = map_catalog(record, matched.map(|idx| &survey[idx]), aliases);
            pb.inc(1);
            result
        })
        .collect::<Result<_>>()?;
    pb.finish_with_message(format!("Phase 3: Mapped {} catalog rows", records.len()));

    // Phase 4
    let catalog_ids: FxHashSet<&str> = catalog.iter().map(|r| r.id.as_str()).collect();
    let before = records.len();
    for idx in claims.unclaimed(survey.len()) {
        let merged = map_survey_only(idx, &survey[idx], aliases)?;
        if catalog_ids.contains(merged.id.as_str()) {
            return Err(ReconcileError::IdentifierCollision(merged.id));
        }
        records.push(merged);
    }
    stats.appended_unmatched = records.len() - before;
    debug_assert_eq!(stats.appended_unmatched, survey.len() - claims.len());
    info!(
        "Phase 4: Appended {} unmatched survey records",
        stats.appended_unmatched
    );

    stats.output_rows = records.len();
    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    info!(
        "Matched {}/{} catalog rows ({:.1}%)",
        stats.total_matches(),
        stats.catalog_rows,
        stats.match_rate()
    );

    Ok(ReconcileOutput { records, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn catalog(id: &str, title: &str, date: Option<(i32, u32, u32)>) -> CatalogRecord {
        CatalogRecord {
            id: id.to_string(),
            steam_title: Some(title.to_string()),
            steam_release_date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            ..Default::default()
        }
    }

    fn survey(name: &str, main: Option<f64>, year: Option<i32>, popularity: i64) -> SurveyRecord {
        SurveyRecord {
            name: name.to_string(),
            main_story: main,
            release_year: year,
            popularity,
            ..Default::default()
        }
    }

    #[test]
    fn test_celeste_end_to_end() {
        let catalog = vec![catalog("1", "Celeste", Some((2018, 1, 25)))];
        let survey = vec![survey("Celeste", Some(8.5), Some(2018), 500)];

        let out = reconcile(&catalog, &survey, &Aliases::default()).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].id, "1");
        assert_eq!(out.records[0].hltb_main, Some(510));
        assert_eq!(out.stats.matched_by_year, 1);
        assert_eq!(out.stats.year_distance_0, 1);
        assert_eq!(out.stats.appended_unmatched, 0);
        assert_eq!(out.stats.output_rows, 1);
    }

    #[test]
    fn test_unmatched_survey_records_are_appended() {
        let catalog = vec![
            catalog("1", "Hades", Some((2020, 9, 17))),
            catalog("2", "Unknown Game", None),
        ];
        let survey = vec![
            survey("Hades", Some(22.0), Some(2020), 100),
            survey("Outer Wilds", Some(15.5), Some(2019), 50),
            survey("Hades", Some(20.0), Some(2020), 10),
        ];

        let out = reconcile(&catalog, &survey, &Aliases::default()).unwrap();
        let ids: Vec<&str> = out.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "hltb-1", "hltb-2"]);
        assert_eq!(out.records[0].hltb_main, Some(1320));
        assert_eq!(out.records[1].hltb_main, None);
        assert_eq!(out.records[2].title.as_deref(), Some("Outer Wilds"));
        assert_eq!(out.records[2].hltb_main, Some(930));

        assert_eq!(out.stats.total_matches(), 1);
        assert_eq!(out.stats.no_candidates, 1);
        assert_eq!(
            out.stats.appended_unmatched,
            out.stats.survey_rows - out.stats.total_matches()
        );
    }

    #[test]
    fn test_survey_record_is_claimed_once() {
        // Two catalog rows share a title; only one survey entry exists.
        let catalog = vec![
            catalog("1", "Doom", Some((2016, 5, 13))),
            catalog("2", "Doom", Some((2016, 5, 13))),
        ];
        let survey = vec![survey("Doom", Some(11.5), Some(2016), 900)];

        let out = reconcile(&catalog, &survey, &Aliases::default()).unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].hltb_main, Some(690));
        assert_eq!(out.records[1].hltb_main, None);
        assert_eq!(out.stats.total_matches(), 1);
        assert_eq!(out.stats.no_candidates, 1);
    }

    #[test]
    fn test_far_year_is_rejected_and_appended() {
        let catalog = vec![catalog("1", "Prey", Some((2017, 5, 5)))];
        let survey = vec![survey("Prey", Some(12.0), Some(2006), 300)];

        let out = reconcile(&catalog, &survey, &Aliases::default()).unwrap();
        assert_eq!(out.stats.rejected_far_year, 1);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].hltb_main, None);
        assert_eq!(out.records[1].id, "hltb-0");
        assert_eq!(
            out.records[1].release_date.as_deref(),
            Some("2006-01-01T00:00:00.000Z")
        );
    }

    #[test]
    fn test_synthetic_id_collision_aborts() {
        let catalog = vec![catalog("hltb-0", "Something Else", None)];
        let survey = vec![survey("Lonely Survey Entry", Some(1.0), None, 1)];

        let err = reconcile(&catalog, &survey, &Aliases::default()).unwrap_err();
        assert!(matches!(err, ReconcileError::IdentifierCollision(ref id) if id == "hltb-0"));
    }
}
