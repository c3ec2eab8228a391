//! Direct identifier-resolution link (`https://doi.org/<doi>`).

use std::sync::Arc;

use async_trait::async_trait;

use super::{AcquireError, AttemptContext, DocumentFetcher, FetchPolicy, Strategy, StrategyOutcome};
use crate::record::Record;
use crate::utils::encode_identifier_path;

const NAME: &str = "DOI link";

/// Strategy 2: follow the resolver redirect to the publisher page.
#[derive(Debug)]
pub struct DoiLinkStrategy {
    base_url: String,
    fetcher: Arc<DocumentFetcher>,
}

impl DoiLinkStrategy {
    #[must_use]
    pub fn new(base_url: &str, fetcher: Arc<DocumentFetcher>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            fetcher,
        }
    }

    /// Canonical resolver URL for `doi`.
    #[must_use]
    pub fn link_for(&self, doi: &str) -> String {
        format!("{}/{}", self.base_url, encode_identifier_path(doi))
    }
}

#[async_trait]
impl Strategy for DoiLinkStrategy {
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
        self.fetcher
            .retrieve(NAME, &self.link_for(doi), FetchPolicy::landing(), ctx)
            .await
    }
}
