//! Candidate lookup index over survey records.

use rustc_hash::FxHashMap;

use crate::models::SurveyRecord;
use crate::normalize::TitleNormalizer;

/// Index mapping a normalized title variant to survey record indices.
pub type TitleIndex = FxHashMap<String, Vec<usize>>;

/// Every normalized title variant of every survey record, pointing back at the
/// records sharing that key.
///
/// Buckets are ordered by descending popularity. Records with equal popularity
/// keep their input order.
#[derive(Debug, Default)]
pub struct SurveyIndex {
    buckets: TitleIndex,
    normalizer: TitleNormalizer,
}

impl SurveyIndex {
    pub fn build(records: &[SurveyRecord]) -> Self {
        Self::build_with(records, TitleNormalizer::default())
    }

    /// Index under a specific key function. Queries against this index must
    /// be normalized the same way, see [`SurveyIndex::normalizer`].
    pub fn build_with(records: &[SurveyRecord], normalizer: TitleNormalizer) -> Self {
        let mut buckets = TitleIndex::default();
        for (idx, record) in records.iter().enumerate() {
            for key in normalizer.variants(&record.name) {
                buckets.entry(key).or_default().push(idx);
            }
        }
        for bucket in buckets.values_mut() {
            // Stable: ties stay in file order
            bucket.sort_by(|&a, &b| records[b].popularity.cmp(&records[a].popularity));
        }
        Self {
            buckets,
            normalizer,
        }
    }

    pub fn normalizer(&self) -> TitleNormalizer {
        self.normalizer
    }

    /// Candidates for a normalized key, most popular first.
    pub fn candidates(&self, key: &str) -> &[usize] {
        if key.is_empty() {
            return &[];
        }
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
