//! Content keys used to match the same media across clients.
//!
//! A key is derived from public metadata ids when one is present
//! (`imdb:tt0133093`, `tmdb:movie:603`, `tvdb:81189`, `mbid:<uuid>`). When no
//! id is known the key is a fingerprint over normalized title, year, kind,
//! creator and indices: `fp:<16 hex chars>`.
//!
//! One item can be reached through several candidate keys (one per known id
//! plus the fingerprint). The first candidate is the canonical key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::media::{ExternalIds, MediaType};

/// Stable identity of a piece of content across clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

/// Borrowed view of the fields that feed a key.
#[derive(Debug, Clone, Copy)]
pub struct KeyParts<'a> {
    pub media_type: MediaType,
    pub title: &'a str,
    pub year: Option<i32>,
    /// Artist for music, series title for seasons and episodes.
    pub creator: Option<&'a str>,
    pub parent_index: Option<u32>,
    pub index: Option<u32>,
    pub external_ids: &'a ExternalIds,
}

impl ItemKey {
    /// Wrap an already-computed key string.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical key for `parts`.
    pub fn from_parts(parts: &KeyParts<'_>) -> Self {
        Self::candidates(parts)
            .into_iter()
            .next()
            .unwrap_or_else(|| Self::fingerprint(parts))
    }

    /// Every key this content can be matched under, canonical first.
    pub fn candidates(parts: &KeyParts<'_>) -> Vec<Self> {
        let ids = parts.external_ids;
        let mut keys = Vec::with_capacity(5);
        if let Some(imdb) = non_empty(&ids.imdb) {
            keys.push(Self(format!("imdb:{}", imdb.to_ascii_lowercase())));
        }
        if let Some(tmdb) = non_empty(&ids.tmdb) {
            // TMDB numbers movies and shows independently.
            keys.push(Self(format!("tmdb:{}:{}", parts.media_type, tmdb)));
        }
        if let Some(tvdb) = non_empty(&ids.tvdb) {
            keys.push(Self(format!("tvdb:{tvdb}")));
        }
        if let Some(mbid) = non_empty(&ids.musicbrainz) {
            keys.push(Self(format!("mbid:{}", mbid.to_ascii_lowercase())));
        }
        keys.push(Self::fingerprint(parts));
        keys
    }

    /// Metadata fingerprint ignoring external ids.
    pub fn fingerprint(parts: &KeyParts<'_>) -> Self {
        let material = format!(
            "{}|{}|{}|{}|{}|{}",
            parts.media_type,
            normalize_title(parts.title),
            parts.year.map(|y| y.to_string()).unwrap_or_default(),
            parts.creator.map(normalize_title).unwrap_or_default(),
            parts.parent_index.map(|i| i.to_string()).unwrap_or_default(),
            parts.index.map(|i| i.to_string()).unwrap_or_default(),
        );
        let digest = Sha256::digest(material.as_bytes());
        Self(format!("fp:{}", &hex::encode(digest)[..16]))
    }

    pub fn is_fingerprint(&self) -> bool {
        self.0.starts_with("fp:")
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Lowercase, drop punctuation and a leading article, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else if c == '\'' {
                '\0'
            } else {
                ' '
            }
        })
        .filter(|c| *c != '\0')
        .collect();

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let words = match words.as_slice() {
        [first, rest @ ..] if !rest.is_empty() && matches!(*first, "the" | "a" | "an") => rest,
        all => all,
    };
    words.join(" ")
}
