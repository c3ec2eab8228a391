//! Preprint-server search by exact title.
//!
//! Queries the arXiv Atom API for `ti:"<title>"`, narrowed by the first
//! author's surname when known. A narrowed search with no hit is repeated
//! by title alone. The top hit is downloaded only if its title is similar
//! enough to the record's.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::debug;

use super::scrape::attribute;
use super::{AcquireError, AttemptContext, DocumentFetcher, FetchPolicy, Strategy, StrategyOutcome};
use crate::http::{HttpTimeouts, build_http_client};
use crate::record::Record;
use crate::similarity::{is_accepted, similarity};
use crate::user_agent;
use crate::utils::{compile_static_regex, unescape_entities};

const NAME: &str = "arXiv";

/// Preprint matches must score strictly above this.
pub const PREPRINT_MATCH_THRESHOLD: f64 = 0.8;

static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?s)<entry\b[^>]*>(.*?)</entry>"));
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?s)<title\b[^>]*>(.*?)</title>"));
static ID_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?s)<id>(.*?)</id>"));
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?s)<link\b([^>]*)>"));

/// The parts of an Atom entry the strategy needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArxivEntry {
    pub id: String,
    pub title: String,
    pub pdf_url: String,
}

/// Parses the first `<entry>` of an arXiv Atom feed.
///
/// The PDF link comes from `<link title="pdf">` or `type="application/pdf"`,
/// falling back to the `/abs/` id rewritten to `/pdf/`.
#[must_use]
pub fn parse_atom_entry(xml: &str) -> Option<ArxivEntry> {
    let entry = ENTRY_RE.captures(xml)?.get(1)?.as_str();
    let id = ID_RE.captures(entry)?.get(1)?.as_str().trim().to_string();
    let raw_title = TITLE_RE.captures(entry)?.get(1)?.as_str();
    let title = unescape_entities(raw_title)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let pdf_url = LINK_RE
        .captures_iter(entry)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .find(|attrs| {
            attribute(attrs, "title").is_some_and(|t| t.eq_ignore_ascii_case("pdf"))
                || attribute(attrs, "type").is_some_and(|t| t.eq_ignore_ascii_case("application/pdf"))
        })
        .and_then(|attrs| attribute(attrs, "href"))
        .unwrap_or_else(|| id.replacen("/abs/", "/pdf/", 1));

    Some(ArxivEntry { id, title, pdf_url })
}

/// Strategy 3: title search on the preprint server.
pub struct ArxivStrategy {
    client: Client,
    base_url: String,
    fetcher: Arc<DocumentFetcher>,
}

impl ArxivStrategy {
    /// Creates the strategy against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Client`] when the API client cannot be built.
    pub fn new(
        base_url: &str,
        timeouts: HttpTimeouts,
        fetcher: Arc<DocumentFetcher>,
    ) -> Result<Self, AcquireError> {
        let client = build_http_client(NAME, &user_agent::default_api_user_agent(), timeouts)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            fetcher,
        })
    }

    /// Builds the search URL for `title`, optionally narrowed by `surname`.
    #[must_use]
    pub fn search_url(&self, title: &str, surname: Option<&str>) -> String {
        let phrase = title.replace('"', " ");
        let phrase = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut query = format!("ti:\"{phrase}\"");
        if let Some(surname) = surname {
            query = format!("{query} AND au:{surname}");
        }
        format!(
            "{}/api/query?search_query={}&max_results=1",
            self.base_url,
            urlencoding::encode(&query)
        )
    }

    /// Returns the top search hit for the record, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError`] on transport or status failures.
    #[tracing::instrument(skip(self))]
    pub async fn search(
        &self,
        title: &str,
        surname: Option<&str>,
    ) -> Result<Option<ArxivEntry>, AcquireError> {
        let url = self.search_url(title, surname);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AcquireError::transport(NAME, &url, e))?;
        if !response.status().is_success() {
            return Err(AcquireError::http_status(NAME, &url, response.status().as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| AcquireError::transport(NAME, &url, e))?;
        Ok(parse_atom_entry(&body))
    }
}

impl std::fmt::Debug for ArxivStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArxivStrategy")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Last whitespace token of the first author's family name.
fn first_author_surname(record: &Record) -> Option<String> {
    record
        .authors
        .first()
        .and_then(|author| author.split(',').next())
        .and_then(|family| family.split_whitespace().last())
        .map(|token| token.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl Strategy for ArxivStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_attempt(&self, record: &Record) -> bool {
        !record.title_str().trim().is_empty()
    }

    async fn attempt(
        &self,
        record: &Record,
        ctx: &AttemptContext,
    ) -> Result<StrategyOutcome, AcquireError> {
        let title = record.title_str();
        if title.trim().is_empty() {
            return Ok(StrategyOutcome::Skipped);
        }
        let surname = first_author_surname(record);
        let mut hit = self.search(title, surname.as_deref()).await?;
        if hit.is_none() && surname.is_some() {
            debug!("no preprint hit with author filter; retrying by title");
            hit = self.search(title, None).await?;
        }
        let Some(entry) = hit else {
            debug!("no preprint hit");
            return Ok(StrategyOutcome::NotFound);
        };

        let score = similarity(&entry.title, title);
        if !is_accepted(score, PREPRINT_MATCH_THRESHOLD) {
            debug!(score, hit = %entry.title, "preprint hit below threshold");
            return Ok(StrategyOutcome::NotFound);
        }
        debug!(score, id = %entry.id, "preprint hit accepted");
        self.fetcher
            .retrieve(NAME, &entry.pdf_url, FetchPolicy::direct(true), ctx)
            .await
    }
}
