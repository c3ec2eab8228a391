//! Batch orchestration: resolve, key, acquire.
//!
//! A run owns its batch of records end to end:
//!
//! 1. create the output directory (the only fatal failure);
//! 2. load the metadata cache, resolve every record, save the cache once;
//! 3. assign citekeys across the whole batch;
//! 4. run the strategy chain record by record until the download budget is met.
//!
//! Individual record failures are counted in [`BatchStats`] and never abort
//! the batch.

mod error;

pub use error::PipelineError;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::acquire::{AcquisitionResult, Strategy, StrategyChain};
use crate::cache::{CacheStore, MetadataCache};
use crate::citekey::assign_citekeys;
use crate::config::PipelineConfig;
use crate::metadata::{MetadataResolver, Resolution};
use crate::record::Record;

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub total: usize,
    /// Resolved from a fresh cache entry.
    pub cached: usize,
    /// Resolved through the registry.
    pub matched: usize,
    /// Resolution attempted but no identifier obtained.
    pub unmatched: usize,
    /// Records carrying an identifier or an origin link.
    pub eligible: usize,
    pub downloaded: usize,
    /// Eligible records for which every strategy failed.
    pub exhausted: usize,
    /// Eligible records not attempted because the budget was reached.
    pub skipped_by_budget: usize,
    /// Successful downloads per strategy name.
    pub per_source: BTreeMap<String, usize>,
}

impl BatchStats {
    fn record_resolution(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Cached => self.cached += 1,
            Resolution::Matched { .. } => self.matched += 1,
            Resolution::Unmatched => self.unmatched += 1,
            Resolution::Skipped => {}
        }
    }
}

/// The enriched batch and its counters.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub records: Vec<Record>,
    pub stats: BatchStats,
}

/// Progress notifications emitted during a run.
#[derive(Debug)]
pub enum PipelineEvent<'a> {
    /// A record finished metadata resolution.
    Resolved {
        index: usize,
        total: usize,
        resolution: Resolution,
    },
    /// Acquisition is about to start for `eligible` records.
    AcquisitionStarted { eligible: usize },
    /// The chain finished one record.
    Acquired {
        record: &'a Record,
        result: &'a AcquisitionResult,
    },
}

/// Sequences resolver, citekey generator and strategy chain over a batch.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    resolver: MetadataResolver,
    chain: StrategyChain,
    cache_store: CacheStore,
}

impl Pipeline {
    /// Assembles a pipeline from prebuilt components.
    #[must_use]
    pub fn new(config: PipelineConfig, resolver: MetadataResolver, chain: StrategyChain) -> Self {
        let cache_store = CacheStore::new(config.cache_path.clone());
        Self {
            config,
            resolver,
            chain,
            cache_store,
        }
    }

    /// Builds the default resolver and strategy chain for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when an HTTP client cannot be built.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let resolver = MetadataResolver::from_config(&config)?;
        let chain = StrategyChain::from_config(&config)?;
        Ok(Self::new(config, resolver, chain))
    }

    /// Appends a strategy after the defaults, e.g. the interactive agent.
    pub fn register_strategy(&mut self, strategy: Arc<dyn Strategy>) {
        self.chain.register(strategy);
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn chain(&self) -> &StrategyChain {
        &self.chain
    }

    /// Runs the batch without progress reporting.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Destination`] when the output directory cannot be created.
    pub async fn run(&self, records: Vec<Record>) -> Result<BatchReport, PipelineError> {
        self.run_with_progress(records, |_| {}).await
    }

    /// Runs the batch, calling `on_event` as records progress.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Destination`] when the output directory cannot be created.
    #[tracing::instrument(skip_all, fields(records = records.len(), output = %self.config.output_dir.display()))]
    pub async fn run_with_progress<F>(
        &self,
        mut records: Vec<Record>,
        mut on_event: F,
    ) -> Result<BatchReport, PipelineError>
    where
        F: FnMut(PipelineEvent<'_>),
    {
        let output_dir = self.config.output_dir();
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| PipelineError::Destination {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let mut stats = BatchStats {
            total: records.len(),
            ..BatchStats::default()
        };

        if self.config.skip_metadata {
            debug!("metadata resolution disabled");
        } else {
            self.resolve_all(&mut records, &mut stats, &mut on_event).await;
        }

        assign_citekeys(&mut records);

        stats.eligible = records.iter().filter(|r| r.is_acquirable()).count();
        if self.config.skip_download {
            debug!("acquisition disabled");
        } else {
            self.acquire_all(&mut records, &mut stats, &mut on_event).await;
        }

        info!(
            total = stats.total,
            cached = stats.cached,
            matched = stats.matched,
            unmatched = stats.unmatched,
            downloaded = stats.downloaded,
            exhausted = stats.exhausted,
            skipped_by_budget = stats.skipped_by_budget,
            "batch finished"
        );
        Ok(BatchReport { records, stats })
    }

    async fn resolve_all<F>(&self, records: &mut [Record], stats: &mut BatchStats, on_event: &mut F)
    where
        F: FnMut(PipelineEvent<'_>),
    {
        let mut cache: MetadataCache = self.cache_store.load().await;
        let total = records.len();

        for (index, record) in records.iter_mut().enumerate() {
            let resolution = if !record.title_str().trim().is_empty() {
                self.resolver.resolve(record, &mut cache).await
            } else if record.identifier.is_some() {
                self.resolver.resolve_identifier(record).await
            } else {
                Resolution::Skipped
            };
            stats.record_resolution(resolution);
            on_event(PipelineEvent::Resolved {
                index,
                total,
                resolution,
            });
        }

        if let Err(error) = self.cache_store.save(&cache).await {
            warn!(%error, "metadata cache not saved");
        }
    }

    async fn acquire_all<F>(&self, records: &mut [Record], stats: &mut BatchStats, on_event: &mut F)
    where
        F: FnMut(PipelineEvent<'_>),
    {
        on_event(PipelineEvent::AcquisitionStarted {
            eligible: stats.eligible,
        });
        let output_dir = self.config.output_dir();

        for record in records.iter_mut() {
            if !record.is_acquirable() {
                continue;
            }
            if self
                .config
                .max_downloads
                .is_some_and(|budget| stats.downloaded >= budget)
            {
                stats.skipped_by_budget += 1;
                continue;
            }

            let result = self.chain.acquire(record, output_dir).await;
            match &result {
                AcquisitionResult::Downloaded { source, .. } => {
                    stats.downloaded += 1;
                    *stats.per_source.entry(source.clone()).or_insert(0) += 1;
                }
                AcquisitionResult::AlreadyDownloaded => stats.downloaded += 1,
                AcquisitionResult::Exhausted { .. } => stats.exhausted += 1,
                AcquisitionResult::Ineligible => {}
            }
            on_event(PipelineEvent::Acquired {
                record,
                result: &result,
            });
        }
    }
}
