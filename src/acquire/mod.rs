//! Document acquisition through an ordered chain of strategies.
//!
//! # Architecture
//!
//! - [`Strategy`] - Async trait implemented by each acquisition method
//! - [`StrategyChain`] - Ordered collection tried until the first saved document
//! - [`DocumentFetcher`] - Shared HTTP fetch with PDF/HTML branching
//! - [`AgentStrategy`] - Bounded browser-driven last resort
//!
//! Default order: Unpaywall, DOI link, arXiv, SciDB, SciHub, origin link, and
//! the interactive agent when one is configured.
//!
//! # Example
//!
//! ```no_run
//! use paperbot_core::acquire::StrategyChain;
//! use paperbot_core::config::PipelineConfig;
//! use paperbot_core::record::Record;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::new("./papers");
//! let chain = StrategyChain::from_config(&config)?;
//! let mut record = Record::with_identifier("10.1000/xyz123");
//! record.assign_citekey("Smith2020Dee");
//! let result = chain.acquire(&mut record, config.output_dir()).await;
//! println!("{result:?}");
//! # Ok(())
//! # }
//! ```

mod agent;
mod arxiv;
mod doi_link;
mod error;
mod fetch;
mod mirror;
mod oracle;
mod origin_link;
pub mod scrape;
mod scidb;
mod scihub;
mod unpaywall;

pub use agent::{
    AGENT_STEP_BUDGET, AgentAction, AgentOutcome, AgentStrategy, BrowserLauncher, BrowserSession,
    DEFAULT_SETTLE_DELAY, DecisionOracle, parse_agent_action,
};
pub use arxiv::{ArxivEntry, ArxivStrategy, parse_atom_entry};
pub use doi_link::DoiLinkStrategy;
pub use error::AcquireError;
pub use fetch::{DocumentFetcher, FetchPolicy, LinkScraper};
pub use mirror::MirrorDirectory;
pub use oracle::{DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_URL, GeminiOracle};
pub use origin_link::OriginLinkStrategy;
pub use scidb::SciDbStrategy;
pub use scihub::SciHubStrategy;
pub use unpaywall::UnpaywallStrategy;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{FilenamePolicy, PipelineConfig};
use crate::download::{
    DocumentValidator, RejectReason, SaveOutcome, document_file_name, unique_destination,
};
use crate::record::Record;

/// A validated document committed to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDocument {
    pub path: PathBuf,
    pub bytes: u64,
}

/// What a single strategy attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// A validated document is at the destination.
    Saved(SavedDocument),
    /// The source has nothing for this record.
    NotFound,
    /// The strategy does not apply to this record.
    Skipped,
    /// Content was retrieved but refused.
    Rejected(RejectReason),
}

/// Per-record inputs shared by every strategy attempt.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    destination: PathBuf,
    validator: DocumentValidator,
}

impl AttemptContext {
    #[must_use]
    pub fn new(destination: impl Into<PathBuf>, validator: DocumentValidator) -> Self {
        Self {
            destination: destination.into(),
            validator,
        }
    }

    /// Final path of the document.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    #[must_use]
    pub fn validator(&self) -> &DocumentValidator {
        &self.validator
    }

    /// Writes and validates `bytes` at the destination.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Storage`] when the file cannot be written.
    pub async fn commit(
        &self,
        strategy: &'static str,
        bytes: &[u8],
    ) -> Result<StrategyOutcome, AcquireError> {
        let outcome = self
            .validator
            .save(&self.destination, bytes)
            .await
            .map_err(|e| AcquireError::storage(strategy, e))?;
        Ok(into_strategy_outcome(outcome))
    }

    /// Moves an already downloaded file to the destination and validates it.
    ///
    /// Falls back to copy-and-delete when a rename crosses file systems.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Storage`] when the file cannot be moved.
    pub async fn commit_file(
        &self,
        strategy: &'static str,
        source: &Path,
    ) -> Result<StrategyOutcome, AcquireError> {
        if tokio::fs::rename(source, &self.destination).await.is_err() {
            tokio::fs::copy(source, &self.destination).await.map_err(|e| {
                AcquireError::storage(strategy, crate::download::DownloadError::io(source, e))
            })?;
            if let Err(error) = tokio::fs::remove_file(source).await {
                debug!(path = %source.display(), %error, "could not remove moved file");
            }
        }
        let outcome = self
            .validator
            .validate_file(&self.destination)
            .await
            .map_err(|e| AcquireError::storage(strategy, e))?;
        Ok(into_strategy_outcome(outcome))
    }
}

fn into_strategy_outcome(outcome: SaveOutcome) -> StrategyOutcome {
    match outcome {
        SaveOutcome::Accepted { path, bytes } => StrategyOutcome::Saved(SavedDocument { path, bytes }),
        SaveOutcome::Rejected(reason) => StrategyOutcome::Rejected(reason),
    }
}

/// One named method of obtaining document bytes for a record.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Source name recorded on success.
    fn name(&self) -> &'static str;

    /// Returns `false` when the record lacks what this strategy needs.
    fn can_attempt(&self, record: &Record) -> bool;

    /// Attempts to save the record's document at `ctx.destination()`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError`] on transport or storage failures. The chain
    /// logs the error and moves on.
    async fn attempt(
        &self,
        record: &Record,
        ctx: &AttemptContext,
    ) -> Result<StrategyOutcome, AcquireError>;
}

/// Outcome of running the chain for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionResult {
    /// A strategy saved a validated document.
    Downloaded { source: String, path: PathBuf },
    /// The record was already downloaded before the call.
    AlreadyDownloaded,
    /// Every applicable strategy was tried without success.
    Exhausted { attempted: usize },
    /// The record has neither identifier nor origin link.
    Ineligible,
}

impl AcquisitionResult {
    #[must_use]
    pub fn is_downloaded(&self) -> bool {
        matches!(self, Self::Downloaded { .. } | Self::AlreadyDownloaded)
    }
}

/// A priority-ordered collection of strategies.
///
/// Strategies are tried in registration order; the chain stops at the first
/// one that saves a validated document.
pub struct StrategyChain {
    strategies: Vec<Arc<dyn Strategy>>,
    validator: DocumentValidator,
    filename_policy: FilenamePolicy,
}

impl StrategyChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new(validator: DocumentValidator, filename_policy: FilenamePolicy) -> Self {
        Self {
            strategies: Vec::new(),
            validator,
            filename_policy,
        }
    }

    /// Builds the default chain (without the interactive agent).
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Client`] when an HTTP client cannot be built.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, AcquireError> {
        let fetcher = Arc::new(DocumentFetcher::new(config.document_timeouts)?);
        let mirrors = Arc::new(MirrorDirectory::from_config(config, fetcher.client().clone()));
        let endpoints = &config.endpoints;

        let mut chain = Self::new(
            DocumentValidator::new(config.min_document_bytes),
            config.filename_policy,
        );
        chain.register(Arc::new(UnpaywallStrategy::new(
            &endpoints.unpaywall,
            &config.mailto,
            config.api_timeouts,
            Arc::clone(&fetcher),
        )?));
        chain.register(Arc::new(DoiLinkStrategy::new(&endpoints.doi, Arc::clone(&fetcher))));
        chain.register(Arc::new(ArxivStrategy::new(
            &endpoints.arxiv,
            config.api_timeouts,
            Arc::clone(&fetcher),
        )?));
        chain.register(Arc::new(SciDbStrategy::new(&endpoints.scidb, Arc::clone(&fetcher))));
        chain.register(Arc::new(SciHubStrategy::new(
            mirrors,
            config.mirror_jitter,
            Arc::clone(&fetcher),
        )));
        chain.register(Arc::new(OriginLinkStrategy::new(fetcher)));
        Ok(chain)
    }

    /// Appends a strategy at the lowest priority.
    #[tracing::instrument(skip(self, strategy), fields(strategy_name))]
    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        tracing::Span::current().record("strategy_name", strategy.name());
        debug!(name = strategy.name(), "Registering strategy");
        self.strategies.push(strategy);
    }

    /// Number of registered strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if no strategies are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy names in priority order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs the chain for `record`, saving into `destination_dir`.
    ///
    /// On success the record's acquisition state is marked downloaded with the
    /// winning strategy's name. Failures of individual strategies never abort
    /// the chain.
    #[tracing::instrument(skip_all, fields(citekey = record.citekey().unwrap_or(""), doi = record.identifier.as_deref().unwrap_or("")))]
    pub async fn acquire(&self, record: &mut Record, destination_dir: &Path) -> AcquisitionResult {
        if record.acquisition().is_downloaded() {
            return AcquisitionResult::AlreadyDownloaded;
        }
        if !record.is_acquirable() {
            debug!("record has neither identifier nor origin link");
            return AcquisitionResult::Ineligible;
        }

        let file_name = document_file_name(record, self.filename_policy);
        let ctx = AttemptContext::new(
            unique_destination(destination_dir, &file_name),
            self.validator,
        );

        let mut attempted: usize = 0;
        for strategy in &self.strategies {
            if !strategy.can_attempt(record) {
                debug!(strategy = strategy.name(), "Strategy not applicable, skipping");
                continue;
            }
            attempted += 1;
            debug!(strategy = strategy.name(), "Trying strategy");

            match strategy.attempt(record, &ctx).await {
                Ok(StrategyOutcome::Saved(saved)) => {
                    info!(
                        strategy = strategy.name(),
                        path = %saved.path.display(),
                        bytes = saved.bytes,
                        "Document saved"
                    );
                    record
                        .acquisition_mut()
                        .mark_downloaded(strategy.name(), saved.path.clone());
                    return AcquisitionResult::Downloaded {
                        source: strategy.name().to_string(),
                        path: saved.path,
                    };
                }
                Ok(StrategyOutcome::Rejected(reason)) => {
                    debug!(strategy = strategy.name(), %reason, "Content rejected, trying next");
                }
                Ok(StrategyOutcome::NotFound | StrategyOutcome::Skipped) => {
                    debug!(strategy = strategy.name(), "Nothing found, trying next");
                }
                Err(err) => {
                    warn!(strategy = strategy.name(), error = %err, "Strategy returned error");
                }
            }
        }

        info!(attempted, "All strategies exhausted");
        AcquisitionResult::Exhausted { attempted }
    }
}

impl std::fmt::Debug for StrategyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyChain")
            .field("strategies", &self.names())
            .field("validator", &self.validator)
            .field("filename_policy", &self.filename_policy)
            .finish()
    }
}
