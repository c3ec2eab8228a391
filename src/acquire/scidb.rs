//! Secondary full-text mirror keyed by identifier.

use std::sync::Arc;

use async_trait::async_trait;

use super::scrape::find_scidb_pdf_link;
use super::{AcquireError, AttemptContext, DocumentFetcher, FetchPolicy, Strategy, StrategyOutcome};
use crate::record::Record;
use crate::utils::encode_identifier_path;

const NAME: &str = "SciDB";

/// Strategy 4: `<prefix><doi>`, scraping the landing page for the download host.
#[derive(Debug)]
pub struct SciDbStrategy {
    prefix: String,
    fetcher: Arc<DocumentFetcher>,
}

impl SciDbStrategy {
    /// Creates the strategy; `prefix` is the URL the identifier is appended to.
    #[must_use]
    pub fn new(prefix: &str, fetcher: Arc<DocumentFetcher>) -> Self {
        let prefix = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };
        Self { prefix, fetcher }
    }

    #[must_use]
    pub fn link_for(&self, doi: &str) -> String {
        format!("{}{}", self.prefix, encode_identifier_path(doi))
    }
}

#[async_trait]
impl Strategy for SciDbStrategy {
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
            .retrieve(
                NAME,
                &self.link_for(doi),
                FetchPolicy::mirror(find_scidb_pdf_link),
                ctx,
            )
            .await
    }
}
