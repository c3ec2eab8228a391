//! Document retrieval over HTTP with landing-page fallback.
//!
//! [`DocumentFetcher::retrieve`] implements the branching shared by most
//! strategies: a PDF response is committed directly; an HTML response is
//! scraped for a document link which is fetched exactly once more.

use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::scrape::find_landing_pdf_link;
use super::{AcquireError, AttemptContext, StrategyOutcome};
use crate::config::MAX_DOCUMENT_BYTES;
use crate::download::RejectReason;
use crate::http::{HttpTimeouts, build_http_client, content_type_essence};
use crate::user_agent::BROWSER_USER_AGENT;

/// Locates a document link inside an HTML page.
pub type LinkScraper = fn(&str, &Url) -> Option<String>;

const PDF: &str = "application/pdf";
const OCTET_STREAM: &str = "application/octet-stream";
const HTML: &str = "text/html";
const XHTML: &str = "application/xhtml+xml";

/// How a strategy's responses are interpreted.
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    /// Treat `application/octet-stream` as a document.
    pub accept_octet_stream: bool,
    /// Scraper applied to HTML responses; `None` rejects HTML.
    pub scraper: Option<LinkScraper>,
    /// Upper bound of a random pause before scraping a page.
    pub scrape_jitter: Duration,
}

impl FetchPolicy {
    /// Publisher landing pages: PDF only, scraped with the landing rules.
    #[must_use]
    pub fn landing() -> Self {
        Self {
            accept_octet_stream: false,
            scraper: Some(find_landing_pdf_link),
            scrape_jitter: Duration::ZERO,
        }
    }

    /// Mirror pages: PDF or octet-stream, scraped with `scraper`.
    #[must_use]
    pub fn mirror(scraper: LinkScraper) -> Self {
        Self {
            accept_octet_stream: true,
            scraper: Some(scraper),
            scrape_jitter: Duration::ZERO,
        }
    }

    /// Direct document links: no scraping.
    #[must_use]
    pub fn direct(accept_octet_stream: bool) -> Self {
        Self {
            accept_octet_stream,
            scraper: None,
            scrape_jitter: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.scrape_jitter = jitter;
        self
    }

    fn is_document(&self, essence: &str) -> bool {
        essence == PDF || (self.accept_octet_stream && essence == OCTET_STREAM)
    }
}

enum Fetched {
    Document(Vec<u8>),
    Page { html: String, url: Url },
    Rejected(RejectReason),
    NotFound,
}

/// HTTP client for document and landing-page requests.
///
/// Uses a browser User-Agent; several hosts refuse tool agents.
#[derive(Debug, Clone)]
pub struct DocumentFetcher {
    client: Client,
    max_bytes: u64,
}

impl DocumentFetcher {
    /// Creates a fetcher with the given timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Client`] when the HTTP client cannot be built.
    pub fn new(timeouts: HttpTimeouts) -> Result<Self, AcquireError> {
        let client = build_http_client("document fetcher", BROWSER_USER_AGENT, timeouts)?;
        Ok(Self {
            client,
            max_bytes: MAX_DOCUMENT_BYTES,
        })
    }

    /// Overrides the body size cap.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// The underlying client, shared with strategies that probe hosts.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetches `url` and commits the document to the attempt's destination.
    ///
    /// HTML responses are scraped with the policy's scraper and the found link
    /// is fetched once; a second HTML response is a content rejection.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError`] on transport failures, unexpected statuses or
    /// storage failures.
    #[tracing::instrument(skip(self, policy, ctx))]
    pub async fn retrieve(
        &self,
        strategy: &'static str,
        url: &str,
        policy: FetchPolicy,
        ctx: &AttemptContext,
    ) -> Result<StrategyOutcome, AcquireError> {
        let (html, page_url) = match self.get(strategy, url, &policy).await? {
            Fetched::Document(bytes) => return ctx.commit(strategy, &bytes).await,
            Fetched::Rejected(reason) => return Ok(StrategyOutcome::Rejected(reason)),
            Fetched::NotFound => return Ok(StrategyOutcome::NotFound),
            Fetched::Page { html, url } => (html, url),
        };

        let Some(scraper) = policy.scraper else {
            return Ok(StrategyOutcome::Rejected(RejectReason::UnexpectedContentType(
                HTML.to_string(),
            )));
        };
        pause(policy.scrape_jitter).await;
        let Some(link) = scraper(&html, &page_url) else {
            debug!(page = %page_url, "no document link on landing page");
            return Ok(StrategyOutcome::NotFound);
        };
        debug!(page = %page_url, link = %link, "following scraped document link");

        match self.get(strategy, &link, &policy).await? {
            Fetched::Document(bytes) => ctx.commit(strategy, &bytes).await,
            Fetched::Page { .. } => Ok(StrategyOutcome::Rejected(
                RejectReason::UnexpectedContentType(HTML.to_string()),
            )),
            Fetched::Rejected(reason) => Ok(StrategyOutcome::Rejected(reason)),
            Fetched::NotFound => Ok(StrategyOutcome::NotFound),
        }
    }

    async fn get(
        &self,
        strategy: &'static str,
        url: &str,
        policy: &FetchPolicy,
    ) -> Result<Fetched, AcquireError> {
        debug!(strategy, url, "fetching");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AcquireError::transport(strategy, url, e))?;

        let status = response.status();
        if matches!(status.as_u16(), 404 | 410) {
            return Ok(Fetched::NotFound);
        }
        if !status.is_success() {
            return Err(AcquireError::http_status(strategy, url, status.as_u16()));
        }

        let essence = content_type_essence(&response);
        let final_url = response.url().clone();
        if policy.is_document(&essence) {
            return Ok(match self.read_capped(strategy, url, response).await? {
                Some(bytes) => Fetched::Document(bytes),
                None => Fetched::Rejected(RejectReason::TooLarge {
                    limit: self.max_bytes,
                }),
            });
        }
        if essence == HTML || essence == XHTML {
            return Ok(match self.read_capped(strategy, url, response).await? {
                Some(bytes) => Fetched::Page {
                    html: String::from_utf8_lossy(&bytes).into_owned(),
                    url: final_url,
                },
                None => Fetched::Rejected(RejectReason::TooLarge {
                    limit: self.max_bytes,
                }),
            });
        }
        debug!(strategy, content_type = %essence, "unexpected content type");
        Ok(Fetched::Rejected(RejectReason::UnexpectedContentType(essence)))
    }

    /// Reads the body, returning `None` when it exceeds the cap.
    async fn read_capped(
        &self,
        strategy: &'static str,
        url: &str,
        response: reqwest::Response,
    ) -> Result<Option<Vec<u8>>, AcquireError> {
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Ok(None);
        }
        let mut stream = response.bytes_stream();
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| AcquireError::transport(strategy, url, e))?;
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Ok(None);
            }
            body.extend_from_slice(&chunk);
        }
        Ok(Some(body))
    }
}

async fn pause(jitter: Duration) {
    if jitter.is_zero() {
        return;
    }
    let millis = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
    let wait = rand::thread_rng().gen_range(0..=millis);
    tokio::time::sleep(Duration::from_millis(wait)).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::download::DocumentValidator;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn pdf_body() -> Vec<u8> {
        let mut body = b"%PDF-1.5\n".to_vec();
        body.resize(4096, b'x');
        body
    }

    fn context(dir: &std::path::Path) -> AttemptContext {
        AttemptContext::new(dir.join("doc.pdf"), DocumentValidator::new(1024))
    }

    fn fetcher() -> DocumentFetcher {
        DocumentFetcher::new(HttpTimeouts::from_secs(5, 5)).unwrap()
    }

    #[tokio::test]
    async fn test_retrieve_direct_pdf() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/paper.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_body(), "application/pdf"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let outcome = fetcher()
            .retrieve("test", &format!("{}/paper.pdf", server.uri()), FetchPolicy::landing(), &ctx)
            .await
            .unwrap();
        assert!(matches!(outcome, StrategyOutcome::Saved(_)));
        assert!(ctx.destination().exists());
    }

    #[tokio::test]
    async fn test_retrieve_scrapes_landing_page_once() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let html = r#"<html><head><meta name="citation_pdf_url" content="/files/full.pdf"></head></html>"#;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/full.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_body(), "application/pdf"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let outcome = fetcher()
            .retrieve("test", &format!("{}/landing", server.uri()), FetchPolicy::landing(), &ctx)
            .await
            .unwrap();
        assert!(matches!(outcome, StrategyOutcome::Saved(_)));
    }

    #[tokio::test]
    async fn test_retrieve_scraped_link_returning_html_is_rejected() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let html = r#"<a href="/next.pdf">PDF</a>"#;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/next.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let outcome = fetcher()
            .retrieve("test", &format!("{}/landing", server.uri()), FetchPolicy::landing(), &ctx)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            StrategyOutcome::Rejected(RejectReason::UnexpectedContentType(_))
        ));
        assert!(!ctx.destination().exists());
    }

    #[tokio::test]
    async fn test_octet_stream_only_for_mirrors() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(pdf_body(), "application/octet-stream"),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/blob", server.uri());

        let ctx = context(dir.path());
        let landing = fetcher()
            .retrieve("test", &url, FetchPolicy::landing(), &ctx)
            .await
            .unwrap();
        assert!(matches!(landing, StrategyOutcome::Rejected(_)));

        let mirror = fetcher()
            .retrieve("test", &url, FetchPolicy::mirror(find_landing_pdf_link), &ctx)
            .await
            .unwrap();
        assert!(matches!(mirror, StrategyOutcome::Saved(_)));
    }

    #[tokio::test]
    async fn test_not_found_and_server_error() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let gone = fetcher()
            .retrieve("test", &format!("{}/gone", server.uri()), FetchPolicy::landing(), &ctx)
            .await
            .unwrap();
        assert!(matches!(gone, StrategyOutcome::NotFound));

        let broken = fetcher()
            .retrieve("test", &format!("{}/broken", server.uri()), FetchPolicy::landing(), &ctx)
            .await;
        assert!(matches!(
            broken,
            Err(AcquireError::HttpStatus { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_body_over_cap_is_rejected() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/big.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_body(), "application/pdf"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let outcome = fetcher()
            .with_max_bytes(2048)
            .retrieve("test", &format!("{}/big.pdf", server.uri()), FetchPolicy::landing(), &ctx)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            StrategyOutcome::Rejected(RejectReason::TooLarge { limit: 2048 })
        );
    }
}
