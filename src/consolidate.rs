//! Merge several pipe-delimited game files into one.
//!
//! The primary file is taken whole. Rows of the other files are skipped when
//! a row with the same normalized title and release year was already kept.
//! Columns are matched by header name against the first file's header.

use rustc_hash::FxHashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::normalize::normalize_title;
use crate::output::{PipeTable, PipeWriter};
use crate::safety::canonical;

pub const DEFAULT_PRIMARY: &str = "merged_games.csv";

/// File name prefixes never picked up as inputs (previous outputs, reports).
const IGNORED_PREFIXES: [&str; 2] = ["merged_all", "enrich_results"];

/// `normalized title|year`, with year `0000` when the date is too short.
/// Rows without a usable title have no key.
pub fn dedup_key(title: Option<&str>, release_date: Option<&str>) -> Option<String> {
    let title = normalize_title(title?);
    if title.is_empty() {
        return None;
    }
    let year = release_date
        .and_then(|d| d.trim().get(..4))
        .unwrap_or("0000");
    Some(format!("{title}|{year}"))
}

/// CSV files of `dir` in processing order: `primary` first, then by name.
/// The output file itself and previous outputs are excluded. A file that
/// merely shares the output's name in another directory is kept.
pub fn discover_inputs(dir: &Path, primary: &str, output: &Path) -> Result<Vec<PathBuf>> {
    let output = canonical(output);
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            name.ends_with(".csv")
                && canonical(path) != output
                && !IGNORED_PREFIXES.iter().any(|p| name.starts_with(p))
        })
        .collect();
    order_inputs(&mut files, primary);
    Ok(files)
}

/// Primary file first, the rest by file name.
pub fn order_inputs(files: &mut [PathBuf], primary: &str) {
    files.sort_by(|a, b| {
        let a_name = a.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let b_name = b.file_name().and_then(|n| n.to_str()).unwrap_or("");
        (a_name != primary, a_name).cmp(&(b_name != primary, b_name))
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub added: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidateReport {
    pub files: Vec<FileReport>,
    pub total_rows: usize,
}

/// Merge `inputs` (already ordered) into `output`.
pub fn consolidate_files(inputs: &[PathBuf], primary: &str, output: &Path) -> Result<ConsolidateReport> {
    let mut report = ConsolidateReport::default();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut writer: Option<(PipeWriter<File>, Vec<String>)> = None;

    for path in inputs {
        let table = PipeTable::load(path)?;
        if table.headers.is_empty() {
            continue;
        }
        let is_primary = path.file_name().and_then(|n| n.to_str()) == Some(primary);

        if writer.is_none() {
            let out = PipeWriter::new(File::create(output)?, &table.headers)?;
            writer = Some((out, table.headers.clone()));
        }
        let Some((out, header)) = writer.as_mut() else {
            continue;
        };

        // Output column → position in this file
        let mapping: Vec<Option<usize>> = header.iter().map(|h| table.column(h)).collect();
        let title = table.column("title");
        let date = table.column("releaseDate");

        let mut file_report = FileReport {
            path: path.clone(),
            added: 0,
            skipped: 0,
        };
        for row in &table.rows {
            let key = dedup_key(PipeTable::cell(row, title), PipeTable::cell(row, date));
            if let Some(key) = key {
                if !is_primary && seen.contains(&key) {
                    file_report.skipped += 1;
                    continue;
                }
                seen.insert(key);
            }
            let fields: Vec<&str> = mapping
                .iter()
                .map(|pos| pos.and_then(|p| row.get(p)).unwrap_or(""))
                .collect();
            out.write_row(&fields)?;
            file_report.added += 1;
        }

        info!(
            "{}: added {} rows (skipped {} duplicates)",
            path.display(),
            file_report.added,
            file_report.skipped
        );
        report.total_rows += file_report.added;
        report.files.push(file_report);
    }

    if let Some((out, _)) = writer {
        out.finish()?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key() {
        assert_eq!(
            dedup_key(Some("Pokémon Red"), Some("1996-02-27T00:00:00.000Z")),
            Some("pokemonred|1996".to_string())
        );
        assert_eq!(dedup_key(Some("Celeste"), None), Some("celeste|0000".to_string()));
        assert_eq!(dedup_key(Some("Celeste"), Some("98")), Some("celeste|0000".to_string()));
        assert_eq!(dedup_key(Some("???"), Some("2001")), None);
        assert_eq!(dedup_key(None, Some("2001")), None);
    }

    #[test]
    fn test_order_inputs_primary_first() {
        let mut files = vec![
            PathBuf::from("csv/b_extra.csv"),
            PathBuf::from("csv/merged_games.csv"),
            PathBuf::from("csv/a_extra.csv"),
        ];
        order_inputs(&mut files, DEFAULT_PRIMARY);
        let names: Vec<&str> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["merged_games.csv", "a_extra.csv", "b_extra.csv"]);
    }

    #[test]
    fn test_output_excluded_by_path_not_name() {
        let inputs_dir = tempfile::tempdir().unwrap();
        let other_dir = tempfile::tempdir().unwrap();
        let primary = inputs_dir.path().join("merged_games.csv");
        let extra = inputs_dir.path().join("extra.csv");
        std::fs::write(&primary, "id|title\n").unwrap();
        std::fs::write(&extra, "id|title\n").unwrap();

        // Same file name elsewhere: still an input
        let elsewhere = other_dir.path().join("extra.csv");
        let inputs = discover_inputs(inputs_dir.path(), DEFAULT_PRIMARY, &elsewhere).unwrap();
        assert_eq!(inputs, vec![primary.clone(), extra.clone()]);

        // The file itself, spelled differently: excluded
        let same = inputs_dir.path().join(".").join("extra.csv");
        let inputs = discover_inputs(inputs_dir.path(), DEFAULT_PRIMARY, &same).unwrap();
        assert_eq!(inputs, vec![primary]);
    }

    #[test]
    fn test_consolidate_skips_known_games() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("merged_games.csv");
        let extra = dir.path().join("extra.csv");
        let output = dir.path().join("merged_all_games.csv");

        std::fs::write(
            &primary,
            "id|title|releaseDate\n\
             1|Celeste|2018-01-25T00:00:00.000Z\n\
             2|Celeste|2018-01-25T00:00:00.000Z\n\
             3|Hades|\n",
        )
        .unwrap();
        // Different column order; matched by name
        std::fs::write(
            &extra,
            "releaseDate|id|title\n\
             2018-03-01T00:00:00.000Z|x1|CELESTE\n\
             2020-09-17T00:00:00.000Z|x2|Hades\n\
             |x3|Hades\n\
             |x4|\n",
        )
        .unwrap();

        let inputs = discover_inputs(dir.path(), DEFAULT_PRIMARY, &output).unwrap();
        assert_eq!(inputs, vec![primary.clone(), extra.clone()]);

        let report = consolidate_files(&inputs, DEFAULT_PRIMARY, &output).unwrap();
        assert_eq!(report.total_rows, 5);
        assert_eq!(report.files[0].added, 3);
        assert_eq!(report.files[1].added, 2);
        assert_eq!(report.files[1].skipped, 2);

        let merged = PipeTable::load(&output).unwrap();
        assert_eq!(merged.headers, vec!["id", "title", "releaseDate"]);
        let ids: Vec<&str> = merged.rows.iter().map(|r| r.get(0).unwrap()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "x2", "x4"]);
    }
}
