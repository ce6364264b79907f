//! Projection of catalog/survey records onto the fixed output schema.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;

use crate::aliases::{AliasMap, Aliases};
use crate::error::Result;
use crate::models::{CatalogRecord, MergedRecord, PlatformEntry, SurveyRecord};

// ============================================================================
// Output Schema
// ============================================================================

/// Output header, in column order. Downstream loaders address columns by name,
/// but the order is part of the file contract too.
pub const OUTPUT_COLUMNS: [&str; 33] = [
    "id",
    "title",
    "coverImage",
    "backgroundImage",
    "releaseDate",
    "description",
    "screenshots",
    "videos",
    "steamUrl",
    "opencriticUrl",
    "igdbUrl",
    "hltbUrl",
    "opencriticScore",
    "igdbScore",
    "steamAppId",
    "steamReviewScore",
    "steamReviewCount",
    "steamReviewPercent",
    "isDlc",
    "igdbId",
    "studio",
    "genres",
    "platforms",
    "igdbTime",
    "dataMissing",
    "dataFetched",
    "hltbMain",
    "hltbExtra",
    "hltbCompletionist",
    "storyline",
    "summary",
    "status",
    "gameType",
];

/// Prefix of identifiers minted for survey records with no catalog row.
pub const SYNTHETIC_ID_PREFIX: &str = "hltb-";

static STEAM_APP_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"app/(\d+)").unwrap());

// ============================================================================
// Conversions
// ============================================================================

fn checked_minutes(hours: f64) -> Option<f64> {
    let minutes = hours * 60.0;
    (minutes.is_finite() && minutes.abs() < i64::MAX as f64).then_some(minutes)
}

/// Hours to whole minutes, truncating. `None` stays `None`, and so does a
/// value with no representable minute count.
pub fn hours_to_minutes(hours: Option<f64>) -> Option<i64> {
    hours.and_then(checked_minutes).map(|m| m as i64)
}

/// Hours to the nearest whole minute.
pub fn hours_to_rounded_minutes(hours: Option<f64>) -> Option<i64> {
    hours.and_then(checked_minutes).map(|m| m.round() as i64)
}

/// ISO 8601 timestamp at midnight UTC, the format the database expects.
pub fn format_iso_date(date: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date.format("%Y-%m-%d"))
}

pub fn extract_steam_app_id(url: &str) -> Option<String> {
    STEAM_APP_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn synthetic_id(survey_idx: usize) -> String {
    format!("{SYNTHETIC_ID_PREFIX}{survey_idx}")
}

/// Merge comma-separated tag lists from several sources.
///
/// Each name is trimmed and passed through `aliases`; duplicates are removed
/// case-insensitively, keeping the first spelling seen.
pub fn merge_tags(sources: &[Option<&str>], aliases: &AliasMap) -> Vec<String> {
    let mut seen = FxHashSet::default();
    let mut tags = Vec::new();
    for text in sources.iter().flatten() {
        for raw in text.split(',') {
            if raw.trim().is_empty() {
                continue;
            }
            let name = aliases.resolve(raw);
            if seen.insert(name.to_lowercase()) {
                tags.push(name);
            }
        }
    }
    tags
}

/// JSON array of genre names, or `None` when there are none.
pub fn genres_json(sources: &[Option<&str>], aliases: &AliasMap) -> Result<Option<String>> {
    let genres = merge_tags(sources, aliases);
    if genres.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(&genres)?))
}

/// JSON array of `{name, releaseDate}` objects, or `None` when there are none.
pub fn platforms_json(
    sources: &[Option<&str>],
    aliases: &AliasMap,
    release_date: Option<&str>,
) -> Result<Option<String>> {
    let entries: Vec<PlatformEntry> = merge_tags(sources, aliases)
        .into_iter()
        .map(|name| PlatformEntry {
            name,
            release_date: release_date.map(str::to_string),
        })
        .collect();
    if entries.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(&entries)?))
}

// ============================================================================
// Record Mapping
// ============================================================================

/// Map a catalog row and its matched survey record (if any).
pub fn map_catalog(
    record: &CatalogRecord,
    survey: Option<&SurveyRecord>,
    aliases: &Aliases,
) -> Result<MergedRecord> {
    let release_date = record.release_date().map(format_iso_date);

    let genres = genres_json(
        &[
            record.steam_tags.as_deref(),
            record.oc_genres.as_deref(),
            survey.and_then(|s| s.genres.as_deref()),
        ],
        &aliases.genres,
    )?;
    let platforms = platforms_json(
        &[record.platforms.as_deref(), survey.and_then(|s| s.platforms.as_deref())],
        &aliases.platforms,
        release_date.as_deref(),
    )?;

    Ok(MergedRecord {
        id: record.id.clone(),
        title: record.display_title().map(str::to_string),
        release_date,
        steam_url: record.steam_url.clone(),
        opencritic_url: record.opencritic_url.clone(),
        hltb_url: survey.and_then(|s| s.source_url.clone()),
        opencritic_score: record
            .critic_score
            .filter(|s| *s >= 0.0)
            .map(|s| s.round() as i64),
        steam_app_id: record.steam_url.as_deref().and_then(extract_steam_app_id),
        steam_review_score: record.steam_review_rating.clone(),
        steam_review_count: record.steam_review_count,
        steam_review_percent: record.steam_review_percent,
        is_dlc: record.is_dlc,
        studio: record
            .steam_developer
            .clone()
            .or_else(|| record.oc_developer.clone()),
        genres,
        platforms,
        hltb_main: hours_to_minutes(survey.and_then(|s| s.main_story)),
        hltb_extra: hours_to_minutes(survey.and_then(|s| s.main_plus_sides)),
        hltb_completionist: hours_to_minutes(survey.and_then(|s| s.completionist)),
    })
}

/// Map a survey record nobody claimed into a standalone row.
pub fn map_survey_only(
    survey_idx: usize,
    survey: &SurveyRecord,
    aliases: &Aliases,
) -> Result<MergedRecord> {
    let release_date = survey.resolved_release_date().map(format_iso_date);
    let genres = genres_json(&[survey.genres.as_deref()], &aliases.genres)?;
    let platforms = platforms_json(
        &[survey.platforms.as_deref()],
        &aliases.platforms,
        release_date.as_deref(),
    )?;

    Ok(MergedRecord {
        id: synthetic_id(survey_idx),
        title: Some(survey.name.clone()),
        release_date,
        hltb_url: survey.source_url.clone(),
        genres,
        platforms,
        hltb_main: hours_to_minutes(survey.main_story),
        hltb_extra: hours_to_minutes(survey.main_plus_sides),
        hltb_completionist: hours_to_minutes(survey.completionist),
        ..Default::default()
    })
}

/// Cells of one output row, aligned with [`OUTPUT_COLUMNS`].
/// `None` becomes an empty cell.
pub fn output_row(record: &MergedRecord) -> Vec<String> {
    fn opt<T: ToString>(v: &Option<T>) -> String {
        v.as_ref().map(ToString::to_string).unwrap_or_default()
    }
    let empty = String::new;

    vec![
        record.id.clone(),
        opt(&record.title),
        empty(), // coverImage
        empty(), // backgroundImage
        opt(&record.release_date),
        empty(), // description
        empty(), // screenshots
        empty(), // videos
        opt(&record.steam_url),
        opt(&record.opencritic_url),
        empty(), // igdbUrl
        opt(&record.hltb_url),
        opt(&record.opencritic_score),
        empty(), // igdbScore
        opt(&record.steam_app_id),
        opt(&record.steam_review_score),
        opt(&record.steam_review_count),
        opt(&record.steam_review_percent),
        record.is_dlc.to_string(),
        empty(), // igdbId
        opt(&record.studio),
        opt(&record.genres),
        opt(&record.platforms),
        empty(), // igdbTime
        "false".to_string(), // dataMissing
        "true".to_string(),  // dataFetched
        opt(&record.hltb_main),
        opt(&record.hltb_extra),
        opt(&record.hltb_completionist),
        empty(), // storyline
        empty(), // summary
        empty(), // status
        empty(), // gameType
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_hours_to_minutes() {
        assert_eq!(hours_to_minutes(Some(10.5)), Some(630));
        assert_eq!(hours_to_minutes(Some(8.5)), Some(510));
        assert_eq!(hours_to_minutes(Some(0.1)), Some(6));
        assert_eq!(hours_to_minutes(Some(1.999)), Some(119));
        assert_eq!(hours_to_minutes(None), None);
        assert_eq!(hours_to_minutes(Some(1e300)), None);
        assert_eq!(hours_to_minutes(Some(f64::INFINITY)), None);
        assert_eq!(hours_to_minutes(Some(f64::NAN)), None);
        assert_eq!(hours_to_rounded_minutes(Some(1.999)), Some(120));
        assert_eq!(hours_to_rounded_minutes(Some(1e300)), None);
    }

    #[test]
    fn test_format_iso_date() {
        assert_eq!(format_iso_date(date(2018, 1, 25)), "2018-01-25T00:00:00.000Z");
    }

    #[test]
    fn test_extract_steam_app_id() {
        assert_eq!(
            extract_steam_app_id("https://store.steampowered.com/app/504230/Celeste/"),
            Some("504230".to_string())
        );
        assert_eq!(extract_steam_app_id("https://example.com/game"), None);
    }

    #[test]
    fn test_merge_tags_aliases_and_dedup() {
        let aliases = Aliases::default();
        let tags = merge_tags(
            &[Some("Action, Role-Playing ,Indie"), None, Some("RPG, indie, ,Puzzle")],
            &aliases.genres,
        );
        assert_eq!(tags, vec!["Action", "RPG", "Indie", "Puzzle"]);
    }

    #[test]
    fn test_platforms_json_combines_xbox_series() {
        let aliases = Aliases::default();
        let json = platforms_json(
            &[Some("PC, Xbox Series X, Xbox Series S")],
            &aliases.platforms,
            Some("2020-11-10T00:00:00.000Z"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            json,
            r#"[{"name":"PC","releaseDate":"2020-11-10T00:00:00.000Z"},{"name":"Xbox Series X/S","releaseDate":"2020-11-10T00:00:00.000Z"}]"#
        );
    }

    #[test]
    fn test_empty_lists_are_null() {
        let aliases = Aliases::default();
        assert_eq!(genres_json(&[None, Some(" , ")], &aliases.genres).unwrap(), None);
        assert_eq!(platforms_json(&[None], &aliases.platforms, None).unwrap(), None);
    }

    #[test]
    fn test_map_catalog_with_survey() {
        let catalog = CatalogRecord {
            id: "42".into(),
            steam_title: Some("Celeste".into()),
            steam_url: Some("https://store.steampowered.com/app/504230/Celeste/".into()),
            steam_release_date: Some(date(2018, 1, 25)),
            oc_release_date: Some(date(2018, 1, 26)),
            critic_score: Some(91.6),
            steam_developer: None,
            oc_developer: Some("Maddy Makes Games".into()),
            steam_tags: Some("Platformer, Indie".into()),
            oc_genres: Some("Platform".into()),
            platforms: Some("PC, Switch".into()),
            ..Default::default()
        };
        let survey = SurveyRecord {
            name: "Celeste".into(),
            main_story: Some(8.5),
            completionist: Some(37.0),
            source_url: Some("https://howlongtobeat.com/game/42818".into()),
            ..Default::default()
        };
        let merged = map_catalog(&catalog, Some(&survey), &Aliases::default()).unwrap();

        assert_eq!(merged.id, "42");
        assert_eq!(merged.title.as_deref(), Some("Celeste"));
        assert_eq!(merged.release_date.as_deref(), Some("2018-01-25T00:00:00.000Z"));
        assert_eq!(merged.steam_app_id.as_deref(), Some("504230"));
        assert_eq!(merged.opencritic_score, Some(92));
        assert_eq!(merged.studio.as_deref(), Some("Maddy Makes Games"));
        assert_eq!(merged.genres.as_deref(), Some(r#"["Platformer","Indie"]"#));
        assert_eq!(merged.hltb_main, Some(510));
        assert_eq!(merged.hltb_extra, None);
        assert_eq!(merged.hltb_completionist, Some(2220));
        assert_eq!(merged.hltb_url.as_deref(), Some("https://howlongtobeat.com/game/42818"));
    }

    #[test]
    fn test_map_catalog_without_survey_has_null_durations() {
        let catalog = CatalogRecord {
            id: "7".into(),
            oc_title: Some("Only On OpenCritic".into()),
            critic_score: Some(-1.0),
            ..Default::default()
        };
        let merged = map_catalog(&catalog, None, &Aliases::default()).unwrap();
        assert_eq!(merged.title.as_deref(), Some("Only On OpenCritic"));
        assert_eq!(merged.opencritic_score, None);
        assert_eq!(merged.hltb_main, None);
        assert_eq!(merged.genres, None);
    }

    #[test]
    fn test_map_survey_only() {
        let survey = SurveyRecord {
            name: "Obscure Gem".into(),
            main_story: Some(3.25),
            release_year: Some(2009),
            genres: Some("Role Playing Game".into()),
            platforms: Some("Xbox Series S".into()),
            ..Default::default()
        };
        let merged = map_survey_only(17, &survey, &Aliases::default()).unwrap();
        assert_eq!(merged.id, "hltb-17");
        assert_eq!(merged.title.as_deref(), Some("Obscure Gem"));
        assert_eq!(merged.release_date.as_deref(), Some("2009-01-01T00:00:00.000Z"));
        assert_eq!(merged.hltb_main, Some(195));
        assert_eq!(merged.genres.as_deref(), Some(r#"["RPG"]"#));
        assert_eq!(
            merged.platforms.as_deref(),
            Some(r#"[{"name":"Xbox Series X/S","releaseDate":"2009-01-01T00:00:00.000Z"}]"#)
        );
        assert!(!merged.is_dlc);
    }

    #[test]
    fn test_output_row_alignment() {
        let merged = MergedRecord {
            id: "1".into(),
            title: Some("Celeste".into()),
            hltb_main: Some(510),
            is_dlc: true,
            ..Default::default()
        };
        let row = output_row(&merged);
        assert_eq!(row.len(), OUTPUT_COLUMNS.len());
        let col = |name: &str| {
            let pos = OUTPUT_COLUMNS.iter().position(|c| *c == name).unwrap();
            row[pos].as_str()
        };
        assert_eq!(col("id"), "1");
        assert_eq!(col("title"), "Celeste");
        assert_eq!(col("hltbMain"), "510");
        assert_eq!(col("hltbExtra"), "");
        assert_eq!(col("isDlc"), "true");
        assert_eq!(col("dataMissing"), "false");
        assert_eq!(col("dataFetched"), "true");
    }
}
