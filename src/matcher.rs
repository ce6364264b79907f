//! Year-aware selection of a survey record for one catalog row.
//!
//! Policy, in order:
//! 1. No reference year on the catalog row: most popular candidate.
//! 2. Closest known survey year, if within [`YEAR_TOLERANCE`].
//! 3. Otherwise the first candidate with no year at all.
//! 4. Otherwise no match.
//!
//! Preferring "unknown year" over "known but far year" keeps sequels and
//! remakes sharing a title from being attached to the wrong release.

use rustc_hash::FxHashSet;

use crate::index::SurveyIndex;
use crate::models::{CatalogRecord, SurveyRecord};
use crate::normalize::{normalize_opt, TitleNormalizer};

// ============================================================================
// Thresholds
// ============================================================================

/// Maximum accepted distance in years between catalog and survey release.
pub const YEAR_TOLERANCE: u32 = 2;

// ============================================================================
// Claims
// ============================================================================

/// Survey record indices already attached to a catalog row.
///
/// Owned by the caller and moved through every [`YearAwareMatcher::select`]
/// call, so a record can never be handed out twice.
#[derive(Debug, Clone, Default)]
pub struct Claims {
    claimed: FxHashSet<usize>,
}

impl Claims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, idx: usize) -> bool {
        self.claimed.contains(&idx)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    /// Indices in `0..total` nobody claimed, ascending.
    pub fn unclaimed(&self, total: usize) -> impl Iterator<Item = usize> + '_ {
        (0..total).filter(move |idx| !self.claimed.contains(idx))
    }

    fn claim(&mut self, idx: usize) -> bool {
        self.claimed.insert(idx)
    }
}

// ============================================================================
// Query / Decision
// ============================================================================

/// Lookup keys and reference years for one catalog row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchQuery {
    /// Normalized titles in priority order; empty strings are ignored.
    pub titles: Vec<String>,
    pub reference_years: Vec<i32>,
}

impl MatchQuery {
    pub fn from_catalog(record: &CatalogRecord) -> Self {
        Self {
            titles: record.lookup_titles().into_iter().map(normalize_opt).collect(),
            reference_years: record.reference_years(),
        }
    }

    /// Query for free-standing titles, keyed the way `normalizer` keys the
    /// index it will run against.
    pub fn from_titles(
        titles: &[Option<&str>],
        reference_years: Vec<i32>,
        normalizer: TitleNormalizer,
    ) -> Self {
        Self {
            titles: titles.iter().map(|t| normalizer.normalize_opt(*t)).collect(),
            reference_years,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchReason {
    /// Closest known year, with its distance.
    YearDistance(u32),
    /// No candidate year close enough; took a candidate without year data.
    MissingYearFallback,
    /// Catalog row had no reference year; took the most polled candidate.
    MostPopular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    Matched { survey_idx: usize, reason: MatchReason },
    /// No unclaimed record shares any of the titles.
    NoCandidates,
    /// Candidates exist but every known year is too far and none lacks a year.
    Rejected { candidate_count: usize, best_distance: Option<u32> },
}

impl MatchDecision {
    pub fn survey_idx(&self) -> Option<usize> {
        match self {
            MatchDecision::Matched { survey_idx, .. } => Some(*survey_idx),
            _ => None,
        }
    }
}

// ============================================================================
// Matcher
// ============================================================================

pub struct YearAwareMatcher<'a> {
    index: &'a SurveyIndex,
    records: &'a [SurveyRecord],
    tolerance: u32,
}

impl<'a> YearAwareMatcher<'a> {
    pub fn new(index: &'a SurveyIndex, records: &'a [SurveyRecord]) -> Self {
        Self {
            index,
            records,
            tolerance: YEAR_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: u32) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Unclaimed candidates for all titles, de-duplicated, first-seen order.
    pub fn candidates(&self, query: &MatchQuery, claims: &Claims) -> Vec<usize> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        for title in query.titles.iter().filter(|t| !t.is_empty()) {
            for &idx in self.index.candidates(title) {
                if seen.insert(idx) && !claims.is_claimed(idx) {
                    out.push(idx);
                }
            }
        }
        out
    }

    /// Decide without consuming anything.
    pub fn decide(&self, query: &MatchQuery, claims: &Claims) -> MatchDecision {
        let candidates = self.candidates(query, claims);
        if candidates.is_empty() {
            return MatchDecision::NoCandidates;
        }

        if query.reference_years.is_empty() {
            let mut best = candidates[0];
            for &idx in &candidates[1..] {
                if self.records[idx].popularity > self.records[best].popularity {
                    best = idx;
                }
            }
            return MatchDecision::Matched {
                survey_idx: best,
                reason: MatchReason::MostPopular,
            };
        }

        let mut best: Option<(usize, u32)> = None;
        let mut no_year_fallback: Option<usize> = None;

        for &idx in &candidates {
            match self.records[idx].year() {
                Some(year) => {
                    let distance = query
                        .reference_years
                        .iter()
                        .map(|&r| year.abs_diff(r))
                        .min()
                        .unwrap_or(u32::MAX);
                    // Strict: equal distances keep the earlier candidate
                    if best.map_or(true, |(_, d)| distance < d) {
                        best = Some((idx, distance));
                    }
                }
                None => {
                    if no_year_fallback.is_none() {
                        no_year_fallback = Some(idx);
                    }
                }
            }
        }

        match (best, no_year_fallback) {
            (Some((idx, distance)), _) if distance <= self.tolerance => MatchDecision::Matched {
                survey_idx: idx,
                reason: MatchReason::YearDistance(distance),
            },
            (_, Some(idx)) => MatchDecision::Matched {
                survey_idx: idx,
                reason: MatchReason::MissingYearFallback,
            },
            (best, None) => MatchDecision::Rejected {
                candidate_count: candidates.len(),
                best_distance: best.map(|(_, d)| d),
            },
        }
    }

    /// Decide and claim the chosen record. Returns the updated claims.
    pub fn select(&self, query: &MatchQuery, mut claims: Claims) -> (MatchDecision, Claims) {
        let decision = self.decide(query, &claims);
        if let Some(idx) = decision.survey_idx() {
            claims.claim(idx);
        }
        (decision, claims)
    }
}
