//! Abstract enrichment: an ordered chain of identifier-keyed abstract providers.
//!
//! Semantic Scholar is asked first, then the Crossref work record. The first
//! non-empty abstract is appended to the record's BibTeX entry.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::http::{HttpTimeouts, build_http_client};
use crate::record::Record;
use crate::user_agent;
use crate::utils::strip_markup;

use super::MetadataError;
use super::bibtex::{has_abstract, insert_abstract};
use super::crossref::CrossrefClient;

/// A source of abstracts keyed by identifier.
#[async_trait]
pub trait AbstractProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns the plain-text abstract for `doi`, or `None` when the provider has none.
    async fn fetch(&self, doi: &str) -> Result<Option<String>, MetadataError>;
}

// ==================== Semantic Scholar ====================

#[derive(Debug, Deserialize)]
struct SemanticScholarPaper {
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
}

/// Semantic Scholar Graph API provider.
pub struct SemanticScholarProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarProvider {
    /// Creates a provider against `base_url`, sending `x-api-key` when a key is given.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] when the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, MetadataError> {
        let client = build_http_client(
            "semantic-scholar",
            &user_agent::default_api_user_agent(),
            timeouts,
        )?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }
}

impl std::fmt::Debug for SemanticScholarProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticScholarProvider")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AbstractProvider for SemanticScholarProvider {
    fn name(&self) -> &'static str {
        "semantic-scholar"
    }

    #[tracing::instrument(skip(self), fields(provider = "semantic-scholar"))]
    async fn fetch(&self, doi: &str) -> Result<Option<String>, MetadataError> {
        let url = format!("{}/graph/v1/paper/DOI:{doi}?fields=abstract", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| MetadataError::transport("semantic-scholar", doi, e))?;
        if !response.status().is_success() {
            return Err(MetadataError::http_status(
                "semantic-scholar",
                doi,
                response.status().as_u16(),
            ));
        }
        let paper = response
            .json::<SemanticScholarPaper>()
            .await
            .map_err(|e| MetadataError::parse("semantic-scholar", doi, e))?;
        Ok(paper
            .abstract_text
            .map(|text| strip_markup(&text))
            .filter(|text| !text.is_empty()))
    }
}

// ==================== Crossref ====================

/// Abstract deposited with the registry work record.
#[derive(Debug)]
pub struct CrossrefAbstractProvider {
    crossref: Arc<CrossrefClient>,
}

impl CrossrefAbstractProvider {
    #[must_use]
    pub fn new(crossref: Arc<CrossrefClient>) -> Self {
        Self { crossref }
    }
}

#[async_trait]
impl AbstractProvider for CrossrefAbstractProvider {
    fn name(&self) -> &'static str {
        "crossref"
    }

    async fn fetch(&self, doi: &str) -> Result<Option<String>, MetadataError> {
        let work = self.crossref.work(doi).await?;
        Ok(work
            .abstract_text
            .map(|text| strip_markup(&text))
            .filter(|text| !text.is_empty()))
    }
}

// ==================== AbstractChain ====================

/// Providers tried in order; first non-empty abstract wins.
#[derive(Default)]
pub struct AbstractChain {
    providers: Vec<Box<dyn AbstractProvider>>,
}

impl AbstractChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a provider to the end of the chain.
    pub fn register(&mut self, provider: Box<dyn AbstractProvider>) {
        debug!(provider = provider.name(), "registering abstract provider");
        self.providers.push(provider);
    }

    /// Returns the first non-empty abstract for `doi`.
    pub async fn first_abstract(&self, doi: &str) -> Option<String> {
        for provider in &self.providers {
            match provider.fetch(doi).await {
                Ok(Some(text)) => {
                    debug!(provider = provider.name(), "abstract found");
                    return Some(text);
                }
                Ok(None) => debug!(provider = provider.name(), "no abstract"),
                Err(error) => debug!(provider = provider.name(), %error, "abstract lookup failed"),
            }
        }
        None
    }

    /// Appends an abstract to the record's BibTeX entry.
    ///
    /// Skipped silently when the record has no identifier or entry, or the
    /// entry already has an abstract. Returns whether the entry changed.
    #[tracing::instrument(skip_all, fields(doi = record.identifier.as_deref().unwrap_or("")))]
    pub async fn enrich(&self, record: &mut Record) -> bool {
        let (Some(doi), Some(bibtex)) = (record.identifier.clone(), record.bibtex.clone()) else {
            return false;
        };
        if has_abstract(&bibtex) {
            debug!("entry already has an abstract");
            return false;
        }
        let Some(text) = self.first_abstract(&doi).await else {
            return false;
        };
        match insert_abstract(&bibtex, &text) {
            Some(updated) => {
                info!("abstract added");
                record.bibtex = Some(updated);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for AbstractChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("AbstractChain")
            .field("providers", &names)
            .finish()
    }
}
