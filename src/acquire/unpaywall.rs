//! Open-access resolution through the Unpaywall API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{AcquireError, AttemptContext, DocumentFetcher, FetchPolicy, Strategy, StrategyOutcome};
use crate::http::{HttpTimeouts, build_http_client};
use crate::record::Record;
use crate::user_agent;
use crate::utils::encode_identifier_path;

const NAME: &str = "Unpaywall";

#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    best_oa_location: Option<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    url_for_pdf: Option<String>,
    url: Option<String>,
}

impl OaLocation {
    fn best_url(self) -> Option<String> {
        self.url_for_pdf
            .filter(|u| !u.trim().is_empty())
            .or(self.url.filter(|u| !u.trim().is_empty()))
    }
}

/// Strategy 1: identifier → best open-access location.
pub struct UnpaywallStrategy {
    client: Client,
    base_url: String,
    email: String,
    fetcher: Arc<DocumentFetcher>,
}

impl UnpaywallStrategy {
    /// Creates the strategy against `base_url`, identifying with `email`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Client`] when the API client cannot be built.
    pub fn new(
        base_url: &str,
        email: &str,
        timeouts: HttpTimeouts,
        fetcher: Arc<DocumentFetcher>,
    ) -> Result<Self, AcquireError> {
        let client = build_http_client(NAME, &user_agent::default_api_user_agent(), timeouts)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
            fetcher,
        })
    }

    /// Looks up the best open-access URL for `doi`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError`] on transport, status or decoding failures.
    #[tracing::instrument(skip(self))]
    pub async fn best_oa_url(&self, doi: &str) -> Result<Option<String>, AcquireError> {
        let url = format!(
            "{}/v2/{}?email={}",
            self.base_url,
            encode_identifier_path(doi),
            urlencoding::encode(&self.email)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AcquireError::transport(NAME, &url, e))?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AcquireError::http_status(NAME, &url, status.as_u16()));
        }
        let body: UnpaywallResponse = response
            .json()
            .await
            .map_err(|e| AcquireError::parse(NAME, &url, e))?;
        Ok(body.best_oa_location.and_then(OaLocation::best_url))
    }
}

impl std::fmt::Debug for UnpaywallStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnpaywallStrategy")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Strategy for UnpaywallStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_attempt(&self, record: &Record) -> bool {
        record.identifier.is_some()
    }

    async fn attempt(
        &self,
        record: &Record,
        ctx: &AttemptContext,
    ) -> Result<StrategyOutcome, AcquireError> {
        let Some(doi) = record.identifier.as_deref() else {
            return Ok(StrategyOutcome::Skipped);
        };
        let Some(oa_url) = self.best_oa_url(doi).await? else {
            debug!(doi, "no open-access location");
            return Ok(StrategyOutcome::NotFound);
        };
        debug!(doi, url = %oa_url, "open-access location found");
        self.fetcher
            .retrieve(NAME, &oa_url, FetchPolicy::landing(), ctx)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn strategy(base: &str) -> UnpaywallStrategy {
        let fetcher = Arc::new(DocumentFetcher::new(HttpTimeouts::from_secs(5, 5)).unwrap());
        UnpaywallStrategy::new(base, "me@example.org", HttpTimeouts::from_secs(5, 5), fetcher)
            .unwrap()
    }

    #[test]
    fn test_best_url_prefers_pdf_location() {
        let location = OaLocation {
            url_for_pdf: Some("https://a.test/x.pdf".to_string()),
            url: Some("https://a.test/x".to_string()),
        };
        assert_eq!(location.best_url().as_deref(), Some("https://a.test/x.pdf"));

        let location = OaLocation {
            url_for_pdf: Some(" ".to_string()),
            url: Some("https://a.test/x".to_string()),
        };
        assert_eq!(location.best_url().as_deref(), Some("https://a.test/x"));
    }

    #[test]
    fn test_requires_identifier() {
        let s = strategy("http://127.0.0.1:9");
        assert!(!s.can_attempt(&Record::with_title("T")));
        assert!(s.can_attempt(&Record::with_identifier("10.1/x")));
    }

    #[tokio::test]
    async fn test_best_oa_url_null_location() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/v2/10.1000/closed"))
            .and(query_param("email", "me@example.org"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"doi": "10.1000/closed", "best_oa_location": null})),
            )
            .mount(&server)
            .await;

        let url = strategy(&server.uri()).best_oa_url("10.1000/closed").await.unwrap();
        assert!(url.is_none());
    }

    #[tokio::test]
    async fn test_reserved_characters_in_identifier_stay_in_path() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/v2/10.1000/a%23b%3Fc"))
            .and(query_param("email", "me@example.org"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "best_oa_location": {"url_for_pdf": "https://oa.test/ab.pdf"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = strategy(&server.uri()).best_oa_url("10.1000/a#b?c").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://oa.test/ab.pdf"));
    }

    #[tokio::test]
    async fn test_attempt_scrapes_landing_page() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let landing = format!("{}/article/1", server.uri());
        Mock::given(method("GET"))
            .and(path("/v2/10.1000/open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "best_oa_location": {"url_for_pdf": null, "url": landing}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/article/1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"<a href="/article/1/full.pdf">Full text</a>"#, "text/html"),
            )
            .mount(&server)
            .await;
        let mut pdf = b"%PDF-1.6\n".to_vec();
        pdf.resize(3000, b'z');
        Mock::given(method("GET"))
            .and(path("/article/1/full.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(pdf, "application/pdf"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = AttemptContext::new(
            dir.path().join("out.pdf"),
            crate::download::DocumentValidator::new(1024),
        );
        let record = Record::with_identifier("10.1000/open");
        let outcome = strategy(&server.uri()).attempt(&record, &ctx).await.unwrap();
        assert!(matches!(outcome, StrategyOutcome::Saved(_)));
    }
}
