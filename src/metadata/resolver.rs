//! Title-to-identifier resolution against the cache and the registry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, MetadataCache, now_timestamp};
use crate::config::PipelineConfig;
use crate::download::RateLimiter;
use crate::record::Record;
use crate::similarity::{REGISTRY_MATCH_THRESHOLD, normalize_title, similarity};

use super::MetadataError;
use super::abstracts::{AbstractChain, CrossrefAbstractProvider, SemanticScholarProvider};
use super::crossref::{CrossrefClient, CrossrefWork};

/// Registry candidates considered per title query.
pub const SEARCH_ROWS: usize = 5;

/// Outcome of resolving one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// The record had no title (or identifier) to resolve.
    Skipped,
    /// A fresh cache entry supplied the metadata; no network call was made.
    Cached,
    /// The registry supplied an identifier.
    Matched {
        /// Similarity of the accepted candidate (1.0 for identifier lookups).
        score: f64,
    },
    /// No identifier could be obtained this run.
    Unmatched,
}

impl Resolution {
    /// Whether the record now carries registry-backed metadata.
    #[must_use]
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Cached | Self::Matched { .. })
    }
}

/// A scored registry candidate, alive only during selection.
#[derive(Debug)]
struct CandidateMatch<'a> {
    work: &'a CrossrefWork,
    score: f64,
}

/// Resolves records to authoritative registry metadata.
#[derive(Debug)]
pub struct MetadataResolver {
    crossref: Arc<CrossrefClient>,
    abstracts: AbstractChain,
    horizon: Duration,
}

impl MetadataResolver {
    /// Creates a resolver from its collaborators.
    #[must_use]
    pub fn new(crossref: Arc<CrossrefClient>, abstracts: AbstractChain, horizon: Duration) -> Self {
        Self {
            crossref,
            abstracts,
            horizon,
        }
    }

    /// Builds the registry client and the Semantic Scholar → Crossref abstract chain.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] when a client cannot be built.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, MetadataError> {
        let limiter = Arc::new(RateLimiter::new(config.query_delay));
        let crossref = Arc::new(CrossrefClient::new(
            &config.endpoints.crossref,
            &config.mailto,
            config.api_timeouts,
            limiter,
        )?);
        let mut abstracts = AbstractChain::new();
        abstracts.register(Box::new(SemanticScholarProvider::new(
            &config.endpoints.semantic_scholar,
            config.semantic_scholar_api_key.clone(),
            config.api_timeouts,
        )?));
        abstracts.register(Box::new(CrossrefAbstractProvider::new(Arc::clone(&crossref))));
        Ok(Self::new(crossref, abstracts, config.cache_horizon))
    }

    /// Resolves `record` by title, consulting and updating `cache`.
    ///
    /// Network and parse failures are logged and end in [`Resolution::Unmatched`].
    /// The cache is written only when an identifier was obtained.
    #[tracing::instrument(skip_all, fields(title = %record.title_str()))]
    pub async fn resolve(&self, record: &mut Record, cache: &mut MetadataCache) -> Resolution {
        let title_key = normalize_title(record.title_str());
        if title_key.is_empty() {
            debug!("empty title; resolution skipped");
            return Resolution::Skipped;
        }

        if let Some(hit) = cache.lookup_fresh(&title_key, now_timestamp(), self.horizon) {
            debug!(key = hit.key, matched_by = ?hit.matched_by, "fresh cache entry");
            apply_cache_entry(record, hit.entry);
            return Resolution::Cached;
        }

        let score = match self.match_title(record).await {
            Ok(Some(score)) => score,
            Ok(None) => {
                info!("no confident registry match");
                return Resolution::Unmatched;
            }
            Err(error) => {
                warn!(%error, "registry lookup failed");
                return Resolution::Unmatched;
            }
        };

        self.abstracts.enrich(record).await;

        cache.insert(
            title_key.clone(),
            CacheEntry {
                timestamp: now_timestamp(),
                identifier: record.identifier.clone(),
                authors: Some(record.authors_joined()).filter(|a| !a.is_empty()),
                bibtex: record.bibtex.clone(),
                normalized_title: Some(title_key),
            },
        );
        Resolution::Matched { score }
    }

    /// Fills a record that carries only an identifier from the registry work record.
    ///
    /// Failures leave the record with just its identifier.
    #[tracing::instrument(skip_all, fields(doi = record.identifier.as_deref().unwrap_or("")))]
    pub async fn resolve_identifier(&self, record: &mut Record) -> Resolution {
        let Some(doi) = record.identifier.clone() else {
            return Resolution::Skipped;
        };
        let work = match self.crossref.work(&doi).await {
            Ok(work) => work,
            Err(error) => {
                warn!(%error, "registry work lookup failed");
                return Resolution::Unmatched;
            }
        };

        if let Some(title) = work.first_title() {
            record.title = Some(title.to_string());
        }
        let authors = work.formatted_authors();
        if !authors.is_empty() {
            record.authors = authors;
        }
        if let Some(year) = work.year() {
            record.year = Some(year.to_string());
        }
        self.attach_bibtex(record, &doi).await;
        self.abstracts.enrich(record).await;
        Resolution::Matched { score: 1.0 }
    }

    /// Queries the registry and applies the best candidate. Returns its score.
    async fn match_title(&self, record: &mut Record) -> Result<Option<f64>, MetadataError> {
        let title = record.title_str().to_string();
        let candidates = self.crossref.search(&title, SEARCH_ROWS).await?;

        let Some(best) = best_candidate(&title, &candidates) else {
            return Ok(None);
        };
        let Some(doi) = best.work.doi.as_deref().filter(|d| !d.trim().is_empty()) else {
            debug!("best candidate has no identifier");
            return Ok(None);
        };
        info!(doi, score = best.score, "registry match accepted");

        let authors = best.work.formatted_authors();
        if !authors.is_empty() {
            record.authors = authors;
        }
        record.set_identifier(doi);
        let doi = record.identifier.clone().unwrap_or_default();
        self.attach_bibtex(record, &doi).await;
        Ok(Some(best.score))
    }

    async fn attach_bibtex(&self, record: &mut Record, doi: &str) {
        match self.crossref.bibtex(doi).await {
            Ok(entry) => record.apply_bibtex(&entry),
            Err(error) => debug!(%error, "BibTeX fetch failed; continuing without entry"),
        }
    }
}

fn best_candidate<'a>(title: &str, candidates: &'a [CrossrefWork]) -> Option<CandidateMatch<'a>> {
    let wanted = title.to_lowercase();
    let mut best: Option<CandidateMatch<'a>> = None;
    for work in candidates {
        let Some(candidate_title) = work.first_title() else {
            continue;
        };
        let score = similarity(&wanted, &candidate_title.to_lowercase());
        let threshold = best.as_ref().map_or(REGISTRY_MATCH_THRESHOLD, |b| b.score);
        if score > threshold {
            best = Some(CandidateMatch { work, score });
        }
    }
    best
}

fn apply_cache_entry(record: &mut Record, entry: &CacheEntry) {
    if let Some(identifier) = &entry.identifier {
        record.set_identifier(identifier);
    }
    if let Some(authors) = entry.authors.as_deref().filter(|a| !a.trim().is_empty()) {
        record.set_authors_joined(authors);
    }
    if let Some(bibtex) = &entry.bibtex {
        record.apply_bibtex(bibtex);
    }
}
