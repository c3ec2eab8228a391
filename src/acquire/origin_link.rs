//! Direct links carried by the search result itself.

use std::sync::Arc;

use async_trait::async_trait;

use super::{AcquireError, AttemptContext, DocumentFetcher, FetchPolicy, Strategy, StrategyOutcome};
use crate::record::Record;

const NAME: &str = "Origin link";

/// Fetches the origin link when it points at a PDF, then the search result's PDF link.
#[derive(Debug)]
pub struct OriginLinkStrategy {
    fetcher: Arc<DocumentFetcher>,
}

impl OriginLinkStrategy {
    #[must_use]
    pub fn new(fetcher: Arc<DocumentFetcher>) -> Self {
        Self { fetcher }
    }

    fn candidates(record: &Record) -> Vec<&str> {
        let origin = record
            .origin_link
            .as_deref()
            .map(str::trim)
            .filter(|link| link.to_ascii_lowercase().ends_with(".pdf"));
        let direct = record
            .pdf_link
            .as_deref()
            .map(str::trim)
            .filter(|link| !link.is_empty());
        let mut links: Vec<&str> = origin.into_iter().chain(direct).collect();
        links.dedup();
        links
    }
}

#[async_trait]
impl Strategy for OriginLinkStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_attempt(&self, record: &Record) -> bool {
        !Self::candidates(record).is_empty()
    }

    async fn attempt(
        &self,
        record: &Record,
        ctx: &AttemptContext,
    ) -> Result<StrategyOutcome, AcquireError> {
        let mut last = Ok(StrategyOutcome::Skipped);
        for link in Self::candidates(record) {
            last = self
                .fetcher
                .retrieve(NAME, link, FetchPolicy::direct(true), ctx)
                .await;
            if matches!(last, Ok(StrategyOutcome::Saved(_))) {
                break;
            }
        }
        last
    }
}
