//! Tertiary full-text mirror over a discovered host.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::scrape::find_scihub_pdf_link;
use super::{
    AcquireError, AttemptContext, DocumentFetcher, FetchPolicy, MirrorDirectory, Strategy,
    StrategyOutcome,
};
use crate::record::Record;

const NAME: &str = "SciHub";

/// Strategy 5: `{mirror}/{doi}`, or `{mirror}/{origin-link}` without an identifier.
#[derive(Debug)]
pub struct SciHubStrategy {
    mirrors: Arc<MirrorDirectory>,
    jitter: Duration,
    fetcher: Arc<DocumentFetcher>,
}

impl SciHubStrategy {
    #[must_use]
    pub fn new(mirrors: Arc<MirrorDirectory>, jitter: Duration, fetcher: Arc<DocumentFetcher>) -> Self {
        Self {
            mirrors,
            jitter,
            fetcher,
        }
    }

    fn lookup_key(record: &Record) -> Option<&str> {
        record
            .identifier
            .as_deref()
            .or(record.origin_link.as_deref())
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[async_trait]
impl Strategy for SciHubStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_attempt(&self, record: &Record) -> bool {
        Self::lookup_key(record).is_some()
    }

    async fn attempt(
        &self,
        record: &Record,
        ctx: &AttemptContext,
    ) -> Result<StrategyOutcome, AcquireError> {
        let Some(key) = Self::lookup_key(record) else {
            return Ok(StrategyOutcome::Skipped);
        };
        let Some(mirror) = self.mirrors.current().await else {
            debug!("no mirror available");
            return Ok(StrategyOutcome::Skipped);
        };
        let url = format!("{mirror}/{key}");
        let policy = FetchPolicy::mirror(find_scihub_pdf_link).with_jitter(self.jitter);

        let result = self.fetcher.retrieve(NAME, &url, policy, ctx).await;
        // a status for one document says nothing about the host
        if matches!(
            result,
            Err(AcquireError::Transport { .. } | AcquireError::Timeout { .. })
        ) {
            self.mirrors.recheck(&mirror).await;
        }
        result
    }
}
