//! Alias tables for genre and platform names.
//!
//! Sources spell the same tag differently ("Role-Playing", "RPG",
//! "Xbox Series X"). Names are unified here before de-duplication.
//! Extra entries can be layered on top of the defaults from a TOML file:
//!
//! ```toml
//! [genres]
//! "Metroidvania" = "Platformer"
//!
//! [platforms]
//! "Steam Deck" = "PC"
//! ```

use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::Path;

use crate::error::Result;

/// Built-in genre aliases (lowercase key → canonical label).
const DEFAULT_GENRE_ALIASES: &[(&str, &str)] = &[
    ("role-playing", "RPG"),
    ("role playing", "RPG"),
    ("role-playing game", "RPG"),
    ("role playing game", "RPG"),
    ("role-playing (rpg)", "RPG"),
    ("rpg", "RPG"),
    ("sci-fi", "Sci-Fi"),
    ("science fiction", "Sci-Fi"),
    ("beat 'em up", "Beat 'em up"),
    ("beat em up", "Beat 'em up"),
    ("shoot 'em up", "Shoot 'em up"),
    ("shoot em up", "Shoot 'em up"),
    ("shmup", "Shoot 'em up"),
    ("platform", "Platformer"),
    ("platformer", "Platformer"),
    ("first-person shooter", "Shooter"),
    ("fps", "Shooter"),
];

/// Built-in platform aliases (lowercase key → canonical label).
/// "X|S" is avoided on purpose: the pipe is the output delimiter.
const DEFAULT_PLATFORM_ALIASES: &[(&str, &str)] = &[
    ("xbox series x", "Xbox Series X/S"),
    ("xbox series s", "Xbox Series X/S"),
    ("xbox series x|s", "Xbox Series X/S"),
    ("xbox series x/s", "Xbox Series X/S"),
    ("xbox series", "Xbox Series X/S"),
    ("pc", "PC"),
    ("windows", "PC"),
    ("pc (microsoft windows)", "PC"),
    ("ps5", "PlayStation 5"),
    ("playstation 5", "PlayStation 5"),
    ("ps4", "PlayStation 4"),
    ("playstation 4", "PlayStation 4"),
    ("switch", "Nintendo Switch"),
    ("nintendo switch", "Nintendo Switch"),
    ("mac", "Mac"),
    ("macos", "Mac"),
    ("os x", "Mac"),
    ("xone", "Xbox One"),
    ("xbox one", "Xbox One"),
];

/// Case-insensitive alias lookup table.
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    entries: FxHashMap<String, String>,
}

impl AliasMap {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut map = Self::default();
        for (from, to) in pairs {
            map.insert(from, to);
        }
        map
    }

    pub fn insert(&mut self, from: &str, to: &str) {
        self.entries.insert(from.trim().to_lowercase(), to.trim().to_string());
    }

    /// Canonical label for `name`, or the trimmed input when no alias exists.
    pub fn resolve(&self, name: &str) -> String {
        let trimmed = name.trim();
        self.entries
            .get(&trimmed.to_lowercase())
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Genre and platform alias tables passed to the field mapper.
#[derive(Debug, Clone)]
pub struct Aliases {
    pub genres: AliasMap,
    pub platforms: AliasMap,
}

impl Default for Aliases {
    fn default() -> Self {
        Self {
            genres: AliasMap::from_pairs(DEFAULT_GENRE_ALIASES.iter().copied()),
            platforms: AliasMap::from_pairs(DEFAULT_PLATFORM_ALIASES.iter().copied()),
        }
    }
}

/// On-disk shape of an alias override file.
#[derive(Debug, Default, Deserialize)]
struct AliasFile {
    #[serde(default)]
    genres: FxHashMap<String, String>,
    #[serde(default)]
    platforms: FxHashMap<String, String>,
}

impl Aliases {
    /// Defaults extended (and overridden) by the entries in a TOML string.
    pub fn with_overrides(toml_text: &str) -> Result<Self> {
        let file: AliasFile = toml::from_str(toml_text)?;
        let mut aliases = Self::default();
        for (from, to) in &file.genres {
            aliases.genres.insert(from, to);
        }
        for (from, to) in &file.platforms {
            aliases.platforms.insert(from, to);
        }
        Ok(aliases)
    }

    /// Load defaults plus the optional override file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::with_overrides(&std::fs::read_to_string(p)?),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_genre_aliases() {
        let aliases = Aliases::default();
        assert_eq!(aliases.genres.resolve("Role-Playing"), "RPG");
        assert_eq!(aliases.genres.resolve("  role-playing game "), "RPG");
        assert_eq!(aliases.genres.resolve("Science Fiction"), "Sci-Fi");
        assert_eq!(aliases.genres.resolve("Puzzle"), "Puzzle");
    }

    #[test]
    fn test_default_platform_aliases() {
        let aliases = Aliases::default();
        assert_eq!(aliases.platforms.resolve("Xbox Series X"), "Xbox Series X/S");
        assert_eq!(aliases.platforms.resolve("Xbox Series S"), "Xbox Series X/S");
        assert_eq!(aliases.platforms.resolve("PS5"), "PlayStation 5");
        assert_eq!(aliases.platforms.resolve("Stadia"), "Stadia");
    }

    #[test]
    fn test_overrides_extend_and_replace() {
        let toml_text = r#"
            [genres]
            "Metroidvania" = "Platformer"
            "RPG" = "Role-Playing"

            [platforms]
            "Steam Deck" = "PC"
        "#;
        let aliases = Aliases::with_overrides(toml_text).unwrap();
        assert_eq!(aliases.genres.resolve("metroidvania"), "Platformer");
        assert_eq!(aliases.genres.resolve("rpg"), "Role-Playing");
        assert_eq!(aliases.platforms.resolve("steam deck"), "PC");
        // Untouched defaults survive
        assert_eq!(aliases.platforms.resolve("ps4"), "PlayStation 4");
    }

    #[test]
    fn test_invalid_override_is_an_error() {
        assert!(Aliases::with_overrides("[genres]\nAction = 3").is_err());
    }

    #[test]
    fn test_load_without_path() {
        let aliases = Aliases::load(None).unwrap();
        assert!(!aliases.genres.is_empty());
        assert_eq!(aliases.platforms.len(), DEFAULT_PLATFORM_ALIASES.len());
    }
}
