//! Franchise/studio momentum features.
//!
//! For every record with a valid value, the momentum is the weighted mean of
//! the value over the *other* valid records sharing its group key. Records
//! outside any qualifying group get the sentinel.

use chrono::Datelike;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::error::{ReconcileError, Result};
use crate::output::PipeTable;
use crate::progress::create_progress_bar;
use crate::sources::{parse_date, parse_float};

/// How other group members are weighted against the target record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Weighting {
    /// Every other member counts the same.
    Uniform,
    /// `1 / (1 + rate * |Δyear|)`.
    TemporalDecay { rate: f64 },
}

impl Weighting {
    pub fn weight(&self, target_year: i32, other_year: i32) -> f64 {
        match *self {
            Weighting::Uniform => 1.0,
            Weighting::TemporalDecay { rate } => {
                1.0 / (1.0 + rate * f64::from(target_year.abs_diff(other_year)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumConfig {
    pub weighting: Weighting,
    /// Values at or below this are ignored.
    pub min_value: f64,
    pub min_group_size: usize,
    /// Group keys never aggregated. Compared exactly, as stored.
    pub excluded_keys: Vec<String>,
    pub fallback_year: i32,
    pub sentinel: f64,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            weighting: Weighting::TemporalDecay { rate: 0.5 },
            min_value: 0.1,
            min_group_size: 2,
            excluded_keys: vec![String::new(), "unknown".to_string()],
            fallback_year: 2010,
            sentinel: -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumInput {
    pub key: Option<String>,
    pub value: Option<f64>,
    pub year: i32,
}

/// Release year of an ISO/day-first date, else `fallback`.
pub fn year_or(release_date: Option<&str>, fallback: i32) -> i32 {
    release_date
        .and_then(parse_date)
        .map(|d| d.year())
        .unwrap_or(fallback)
}

fn is_excluded(key: &str, config: &MomentumConfig) -> bool {
    config
        .excluded_keys
        .iter()
        .any(|k| k == key)
}

/// Momentum of every input, aligned with `inputs`.
pub fn compute_momentum(inputs: &[MomentumInput], config: &MomentumConfig) -> Vec<f64> {
    let mut groups: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
    for (idx, input) in inputs.iter().enumerate() {
        let valid = input.value.is_some_and(|v| v > config.min_value);
        let key = input.key.as_deref().unwrap_or("");
        if valid && !is_excluded(key, config) {
            groups.entry(key).or_default().push(idx);
        }
    }
    groups.retain(|_, members| members.len() >= config.min_group_size);

    let pb = create_progress_bar(groups.len() as u64, "Computing momentum");
    let computed: Vec<(usize, f64)> = groups
        .into_par_iter()
        .flat_map_iter(|(_, members)| {
            let result = group_momentum(inputs, &members, config);
            pb.inc(1);
            result
        })
        .collect();
    pb.finish_with_message(format!("Computed momentum for {} records", computed.len()));

    let mut out = vec![config.sentinel; inputs.len()];
    for (idx, value) in computed {
        out[idx] = value;
    }
    out
}

fn group_momentum(inputs: &[MomentumInput], members: &[usize], config: &MomentumConfig) -> Vec<(usize, f64)> {
    members
        .iter()
        .filter_map(|&target| {
            let target_year = inputs[target].year;
            let (numerator, denominator) = members
                .iter()
                .filter(|&&other| other != target)
                .fold((0.0, 0.0), |(num, den), &other| {
                    let w = config.weighting.weight(target_year, inputs[other].year);
                    (num + inputs[other].value.unwrap_or(0.0) * w, den + w)
                });
            (denominator > 0.0).then(|| (target, numerator / denominator))
        })
        .collect()
}

/// Build momentum inputs from a merged table.
pub fn inputs_from_table(
    table: &PipeTable,
    file: &str,
    group_column: &str,
    value_column: &str,
    config: &MomentumConfig,
) -> Result<Vec<MomentumInput>> {
    let group = table
        .column(group_column)
        .ok_or_else(|| ReconcileError::missing_column(file, group_column))?;
    let value = table
        .column(value_column)
        .ok_or_else(|| ReconcileError::missing_column(file, value_column))?;
    let date = table.column("releaseDate");

    Ok(table
        .rows
        .iter()
        .map(|row| MomentumInput {
            key: PipeTable::cell(row, Some(group)).map(str::to_string),
            value: PipeTable::cell(row, Some(value)).and_then(parse_float),
            year: year_or(PipeTable::cell(row, date), config.fallback_year),
        })
        .collect())
}
