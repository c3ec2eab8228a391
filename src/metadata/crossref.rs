//! Crossref registry client: bibliographic search, single-work lookup and the
//! BibTeX transform endpoint.
//!
//! All requests carry `mailto` for Crossref's polite pool and go through the
//! shared [`RateLimiter`], which also absorbs `Retry-After` pauses from 429
//! responses.

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::download::rate_limiter::{RateLimiter, parse_retry_after};
use crate::http::{HttpTimeouts, build_http_client};
use crate::user_agent;

use super::MetadataError;

const SERVICE: &str = "crossref";

// ==================== Crossref API Response Types ====================

#[derive(Debug, Deserialize)]
struct CrossrefEnvelope<T> {
    status: String,
    message: T,
}

#[derive(Debug, Deserialize)]
struct CrossrefSearchMessage {
    #[serde(default)]
    items: Vec<CrossrefWork>,
}

/// A work record as returned by `/works`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrossrefWork {
    /// Identifier; uppercase key in the Crossref response.
    #[serde(rename = "DOI", default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub title: Vec<String>,
    #[serde(default)]
    pub author: Vec<CrossrefAuthor>,
    #[serde(default)]
    pub created: Option<CrossrefDate>,
    #[serde(default)]
    pub published: Option<CrossrefDate>,
    /// JATS-formatted abstract, when the publisher deposited one.
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
}

/// An author entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrossrefAuthor {
    pub given: Option<String>,
    pub family: Option<String>,
}

/// A date entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrossrefDate {
    pub date_parts: Option<Vec<Vec<Option<i32>>>>,
}

impl CrossrefWork {
    /// First title, if any.
    #[must_use]
    pub fn first_title(&self) -> Option<&str> {
        self.title.first().map(String::as_str)
    }

    /// Authors with a family name, formatted `"Family, Given"`.
    #[must_use]
    pub fn formatted_authors(&self) -> Vec<String> {
        self.author
            .iter()
            .filter_map(|author| {
                let family = author.family.as_deref().map(str::trim).filter(|f| !f.is_empty())?;
                Some(match author.given.as_deref().map(str::trim) {
                    Some(given) if !given.is_empty() => format!("{family}, {given}"),
                    _ => family.to_string(),
                })
            })
            .collect()
    }

    /// Year from `created`, falling back to `published`.
    #[must_use]
    pub fn year(&self) -> Option<i32> {
        extract_year(self.created.as_ref()).or_else(|| extract_year(self.published.as_ref()))
    }
}

fn extract_year(date: Option<&CrossrefDate>) -> Option<i32> {
    date.and_then(|d| d.date_parts.as_ref())
        .and_then(|parts| parts.first())
        .and_then(|inner| inner.first())
        .copied()
        .flatten()
}

// ==================== CrossrefClient ====================

/// Client for the Crossref REST API.
pub struct CrossrefClient {
    client: Client,
    base_url: String,
    mailto: String,
    limiter: Arc<RateLimiter>,
}

impl CrossrefClient {
    /// Creates a client against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] when `mailto` contains control characters or
    /// the HTTP client cannot be built.
    #[tracing::instrument(skip_all, fields(base_url))]
    pub fn new(
        base_url: impl Into<String>,
        mailto: impl Into<String>,
        timeouts: HttpTimeouts,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, MetadataError> {
        let mailto = mailto.into();
        if mailto.chars().any(|c| c == '\n' || c == '\r' || c == '\0') {
            return Err(MetadataError::InvalidMailto { mailto });
        }
        let client = build_http_client(SERVICE, &user_agent::default_api_user_agent(), timeouts)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mailto,
            limiter,
        })
    }

    /// Searches for up to `rows` works ranked by bibliographic relevance to `title`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] on transport, status or decoding failures.
    #[tracing::instrument(skip(self), fields(service = SERVICE))]
    pub async fn search(&self, title: &str, rows: usize) -> Result<Vec<CrossrefWork>, MetadataError> {
        let url = format!(
            "{}/works?query.bibliographic={}&rows={rows}&sort=relevance&mailto={}",
            self.base_url,
            urlencoding::encode(&title.to_lowercase()),
            urlencoding::encode(&self.mailto)
        );
        let message: CrossrefSearchMessage = self.get_json(&url, title).await?;
        debug!(candidates = message.items.len(), "Crossref search returned");
        Ok(message.items)
    }

    /// Fetches the work registered under `doi`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] on transport, status or decoding failures.
    #[tracing::instrument(skip(self), fields(service = SERVICE))]
    pub async fn work(&self, doi: &str) -> Result<CrossrefWork, MetadataError> {
        let url = format!(
            "{}/works/{}?mailto={}",
            self.base_url,
            urlencoding::encode(doi),
            urlencoding::encode(&self.mailto)
        );
        self.get_json(&url, doi).await
    }

    /// Fetches the canonical BibTeX entry for `doi`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] on transport or status failures.
    #[tracing::instrument(skip(self), fields(service = SERVICE))]
    pub async fn bibtex(&self, doi: &str) -> Result<String, MetadataError> {
        let url = format!(
            "{}/works/{}/transform/application/x-bibtex?mailto={}",
            self.base_url,
            urlencoding::encode(doi),
            urlencoding::encode(&self.mailto)
        );
        let response = self.send(&url, doi).await?;
        let text = response
            .text()
            .await
            .map_err(|e| MetadataError::transport(SERVICE, doi, e))?;
        Ok(text.trim().to_string())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &str) -> Result<T, MetadataError> {
        let response = self.send(url, query).await?;
        let envelope = response
            .json::<CrossrefEnvelope<T>>()
            .await
            .map_err(|e| MetadataError::parse(SERVICE, query, e))?;
        if !envelope.status.eq_ignore_ascii_case("ok") {
            warn!(status = %envelope.status, "Crossref response status was not ok");
            return Err(MetadataError::parse(
                SERVICE,
                query,
                format!("status '{}'", envelope.status),
            ));
        }
        Ok(envelope.message)
    }

    async fn send(&self, url: &str, query: &str) -> Result<reqwest::Response, MetadataError> {
        self.limiter.acquire(url).await;
        debug!(api_url = %url, "Calling Crossref API");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MetadataError::transport(SERVICE, query, e))?;

        let status = response.status();
        if status.as_u16() == 429
            && let Some(delay) = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after)
        {
            self.limiter.record_rate_limit(url, delay).await;
        }
        if !status.is_success() {
            return Err(MetadataError::http_status(SERVICE, query, status.as_u16()));
        }
        Ok(response)
    }
}

impl std::fmt::Debug for CrossrefClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossrefClient")
            .field("base_url", &self.base_url)
            .field("mailto", &self.mailto)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Serde Deserialization Tests ====================

    #[test]
    fn test_search_response_deserialize() {
        let json = serde_json::json!({
            "status": "ok",
            "message": {
                "items": [{
                    "DOI": "10.1000/XYZ",
                    "title": ["Deep Learning Survey"],
                    "author": [
                        {"given": "John", "family": "Smith"},
                        {"name": "Consortium"},
                        {"family": "Doe"}
                    ],
                    "created": {"date-parts": [[2020, 1, 2]]},
                    "abstract": "<jats:p>Text</jats:p>"
                }]
            }
        });
        let envelope: CrossrefEnvelope<CrossrefSearchMessage> = serde_json::from_value(json).unwrap();
        let work = &envelope.message.items[0];
        assert_eq!(work.doi.as_deref(), Some("10.1000/XYZ"));
        assert_eq!(work.first_title(), Some("Deep Learning Survey"));
        assert_eq!(work.formatted_authors(), vec!["Smith, John", "Doe"]);
        assert_eq!(work.year(), Some(2020));
        assert!(work.abstract_text.is_some());
    }

    #[test]
    fn test_work_deserialize_minimal() {
        let work: CrossrefWork = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(work.first_title().is_none());
        assert!(work.formatted_authors().is_empty());
        assert!(work.year().is_none());
    }

    #[test]
    fn test_year_falls_back_to_published() {
        let work: CrossrefWork = serde_json::from_value(serde_json::json!({
            "created": {"date-parts": [[null]]},
            "published": {"date-parts": [[2018]]}
        }))
        .unwrap();
        assert_eq!(work.year(), Some(2018));
    }

    #[test]
    fn test_new_rejects_control_characters_in_mailto() {
        let limiter = Arc::new(RateLimiter::new(std::time::Duration::ZERO));
        let result = CrossrefClient::new("https://api.crossref.org", "a@b\n", HttpTimeouts::API, limiter);
        assert!(matches!(result, Err(MetadataError::InvalidMailto { .. })));
    }

    #[test]
    fn test_debug_omits_client_internals() {
        let limiter = Arc::new(RateLimiter::new(std::time::Duration::ZERO));
        let client =
            CrossrefClient::new("https://api.crossref.org/", "me@example.org", HttpTimeouts::API, limiter)
                .unwrap();
        let debug = format!("{client:?}");
        assert!(debug.contains("https://api.crossref.org\""));
        assert!(debug.contains(".."));
    }
}
