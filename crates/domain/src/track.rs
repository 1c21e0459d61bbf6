//! Catalog tracks and subscriber input normalization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// A subscriber-selectable category that determines default product assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    /// Canonical value stored on subscription metadata.
    pub value: String,
    pub active: bool,
    /// Known synonyms that resolve to this track.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Track {
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            active: true,
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Resolves free-form track input to one active canonical [`Track`].
#[derive(Debug, Clone, Default)]
pub struct TrackResolver {
    tracks: Vec<Track>,
    index: HashMap<String, usize>,
}

impl TrackResolver {
    /// Builds a resolver over the catalog's tracks. Inactive tracks are kept
    /// but never resolve.
    pub fn new(tracks: Vec<Track>) -> Self {
        let mut index = HashMap::new();
        for (i, track) in tracks.iter().enumerate() {
            if !track.active {
                continue;
            }
            index.insert(normalize(&track.value), i);
            for alias in &track.aliases {
                index.entry(normalize(alias)).or_insert(i);
            }
        }
        Self { tracks, index }
    }

    /// Resolves `value` to an active track.
    ///
    /// Case, surrounding whitespace and separators (`_`, `-`, spaces) are
    /// ignored, and known aliases map onto their canonical track.
    pub fn resolve(&self, value: &str) -> Result<&Track> {
        let key = normalize(value);
        if key.is_empty() {
            return Err(DomainError::InvalidTrack(value.to_string()));
        }
        self.index
            .get(&key)
            .map(|&i| &self.tracks[i])
            .ok_or_else(|| DomainError::InvalidTrack(value.to_string()))
    }

    /// Returns the canonical value for `value`.
    pub fn canonical(&self, value: &str) -> Result<String> {
        self.resolve(value).map(|t| t.value.clone())
    }

    /// Returns all active tracks.
    pub fn active_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.active)
    }
}

fn normalize(value: &str) -> String {
    value
        .trim()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TrackResolver {
        TrackResolver::new(vec![
            Track::new("t1", "literary-fiction").with_aliases(["fiction", "lit fic"]),
            Track::new("t2", "mystery").with_aliases(["thriller", "crime"]),
            Track::new("t3", "poetry").inactive(),
        ])
    }

    #[test]
    fn test_resolves_canonical_value() {
        let r = resolver();
        assert_eq!(r.resolve("mystery").unwrap().id, "t2");
    }

    #[test]
    fn test_normalizes_case_and_separators() {
        let r = resolver();
        assert_eq!(r.canonical("  Literary_Fiction ").unwrap(), "literary-fiction");
        assert_eq!(r.canonical("LITERARY FICTION").unwrap(), "literary-fiction");
    }

    #[test]
    fn test_aliases_map_to_canonical() {
        let r = resolver();
        assert_eq!(r.canonical("Thriller").unwrap(), "mystery");
        assert_eq!(r.canonical("lit-fic").unwrap(), "literary-fiction");
    }

    #[test]
    fn test_empty_value_is_invalid() {
        let r = resolver();
        assert!(matches!(r.resolve(""), Err(DomainError::InvalidTrack(_))));
        assert!(matches!(r.resolve("   "), Err(DomainError::InvalidTrack(_))));
    }

    #[test]
    fn test_unknown_and_inactive_are_invalid() {
        let r = resolver();
        assert!(matches!(r.resolve("unknown"), Err(DomainError::InvalidTrack(_))));
        assert!(matches!(r.resolve("poetry"), Err(DomainError::InvalidTrack(_))));
        assert_eq!(r.active_tracks().count(), 2);
    }
}
