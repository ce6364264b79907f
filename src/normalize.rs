//! Title normalization used as the join key between catalogs.
//!
//! CRITICAL: the survey index and the catalog lookups must use the exact same
//! functions here, otherwise keys silently stop matching.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Trailing "(YYYY)" parenthetical used by re-releases: "Doom (2016)".
pub static YEAR_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(\d{4}\)\s*$").unwrap());

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

/// Decompose with NFKD and drop combining marks.
/// e.g., "Pokémon" → "Pokemon", "Ōkami" → "Okami"
pub fn fold_accents(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a title for matching: lowercase ASCII alphanumerics only.
///
/// Total and idempotent. Anything that is not `[a-z0-9]` after accent folding
/// is removed, so `"Marvel's Spider-Man"` and `"Marvels Spiderman"` collide.
pub fn normalize_title(title: &str) -> String {
    fold_accents(title)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Same as [`normalize_title`] for nullable source fields.
pub fn normalize_opt(title: Option<&str>) -> String {
    title.map(normalize_title).unwrap_or_default()
}

/// Strip a trailing "(YYYY)" from a raw title.
pub fn strip_year_suffix(title: &str) -> String {
    YEAR_SUFFIX.replace(title, "").trim().to_string()
}

/// Lowercase words: accents folded, punctuation removed, whitespace runs
/// collapsed to one space. `"NieR: Automata"` becomes `"nier automata"`.
pub fn normalize_words(title: &str) -> String {
    let kept: String = fold_accents(title)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// All normalized keys a survey title should be indexed under.
/// Empty keys are dropped and duplicates collapse.
pub fn title_variants(title: &str) -> Vec<String> {
    TitleNormalizer::Compact.variants(title)
}

// ============================================================================
// NORMALIZATION STRATEGIES
// ============================================================================

/// Key function shared by a survey index and every query run against it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TitleNormalizer {
    /// [`normalize_title`]: `[a-z0-9]` only.
    #[default]
    Compact,
    /// [`normalize_words`]: word boundaries survive.
    Words,
    /// Trimmed and lowercased, nothing removed.
    Lowercase,
}

impl TitleNormalizer {
    pub fn normalize(self, title: &str) -> String {
        match self {
            TitleNormalizer::Compact => normalize_title(title),
            TitleNormalizer::Words => normalize_words(title),
            TitleNormalizer::Lowercase => title.trim().to_lowercase(),
        }
    }

    pub fn normalize_opt(self, title: Option<&str>) -> String {
        title.map(|t| self.normalize(t)).unwrap_or_default()
    }

    /// Plain key plus the key without a trailing "(YYYY)".
    pub fn variants(self, title: &str) -> Vec<String> {
        let mut variants = Vec::with_capacity(2);
        for key in [self.normalize(title), self.normalize(&strip_year_suffix(title))] {
            if !key.is_empty() && !variants.contains(&key) {
                variants.push(key);
            }
        }
        variants
    }
}

// ============================================================================
// TESTS
// ============================================================================
