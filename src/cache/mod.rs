//! Persistent metadata cache keyed by normalized title or citekey.
//!
//! The on-disk shape is a flat JSON object. Entries written by this crate are
//! keyed by normalized title and also carry `normalized_title`; older files may
//! key entries by citekey with no `normalized_title`, in which case the title is
//! recovered from the stored BibTeX on the fly. Lookups never rewrite entries.

mod error;
mod store;

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::metadata::bibtex::BibEntry;
use crate::similarity::normalize_title;

pub use error::CacheError;
pub use store::CacheStore;

/// One cached resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Seconds since the Unix epoch when the entry was written.
    #[serde(default)]
    pub timestamp: f64,
    #[serde(rename = "DOI", alias = "identifier", default)]
    pub identifier: Option<String>,
    /// Authors joined with `"; "`.
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default)]
    pub bibtex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_title: Option<String>,
}

impl CacheEntry {
    /// Returns true when the entry is younger than `horizon` at `now`.
    #[must_use]
    pub fn is_fresh_at(&self, now: f64, horizon: Duration) -> bool {
        now - self.timestamp < horizon.as_secs_f64()
    }
}

/// How a cache entry was matched to a lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMatch {
    /// The entry is stored under the lookup key itself.
    ExactKey,
    /// The entry (keyed by citekey) records the same normalized title.
    StoredTitle,
    /// The entry (keyed by citekey) has no title field; its BibTeX title matched.
    LegacyEntry,
}

/// A matched cache entry.
#[derive(Debug, Clone, Copy)]
pub struct CacheHit<'a> {
    pub key: &'a str,
    pub entry: &'a CacheEntry,
    pub matched_by: CacheMatch,
}

/// In-memory cache mapping. Loaded once per run, saved once per run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataCache {
    entries: BTreeMap<String, CacheEntry>,
}

impl MetadataCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }

    /// Inserts or replaces the entry under `key`.
    pub fn insert(&mut self, key: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(key.into(), entry);
    }

    /// Returns every entry matching `title_key`, best match first.
    ///
    /// Order: the exact key, then citekey-keyed entries whose stored
    /// normalized title equals `title_key`, then legacy entries whose BibTeX
    /// title normalizes to `title_key`.
    #[must_use]
    pub fn matches(&self, title_key: &str) -> Vec<CacheHit<'_>> {
        let mut hits = Vec::new();
        if title_key.is_empty() {
            return hits;
        }
        if let Some((key, entry)) = self.entries.get_key_value(title_key) {
            hits.push(CacheHit {
                key,
                entry,
                matched_by: CacheMatch::ExactKey,
            });
        }
        for (key, entry) in &self.entries {
            if key == title_key {
                continue;
            }
            if entry.normalized_title.as_deref() == Some(title_key) {
                hits.push(CacheHit {
                    key,
                    entry,
                    matched_by: CacheMatch::StoredTitle,
                });
            }
        }
        for (key, entry) in &self.entries {
            if key == title_key || entry.normalized_title.is_some() {
                continue;
            }
            if legacy_title_key(entry).as_deref() == Some(title_key) {
                hits.push(CacheHit {
                    key,
                    entry,
                    matched_by: CacheMatch::LegacyEntry,
                });
            }
        }
        hits
    }

    /// Returns the best entry for `title_key` that is fresh at `now`.
    #[must_use]
    pub fn lookup_fresh(&self, title_key: &str, now: f64, horizon: Duration) -> Option<CacheHit<'_>> {
        self.matches(title_key)
            .into_iter()
            .find(|hit| hit.entry.is_fresh_at(now, horizon))
    }
}

fn legacy_title_key(entry: &CacheEntry) -> Option<String> {
    let bibtex = entry.bibtex.as_deref()?;
    let title = BibEntry::parse(bibtex)?.field("title")?.to_string();
    let key = normalize_title(&title);
    (!key.is_empty()).then_some(key)
}

/// Current time as fractional seconds since the Unix epoch.
#[must_use]
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}
