//! Paperbot Core Library
//!
//! Resolves loosely identified publications (scraped titles, bare DOIs) to
//! authoritative registry metadata and acquires their documents from an
//! ordered chain of open-access and mirror sources.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`similarity`] - Fuzzy title comparison and normalization
//! - [`record`] - Records flowing through the pipeline and their acquisition state
//! - [`cache`] - Persistent metadata cache with expiry
//! - [`metadata`] - Registry client, abstract enrichment, BibTeX handling, resolver
//! - [`citekey`] - Deterministic citation keys with collision suffixes
//! - [`acquire`] - Strategy chain, landing-page scraping, interactive agent
//! - [`download`] - Download validation, file naming, rate limiting
//! - [`pipeline`] - Batch orchestration and statistics
//! - [`report`] - Bibliography and CSV outputs

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod acquire;
pub mod cache;
pub mod citekey;
pub mod config;
pub mod download;
pub mod http;
pub mod metadata;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod similarity;
pub(crate) mod user_agent;
pub mod utils;

#[cfg(test)]
pub mod test_support;

// Re-export commonly used types
pub use acquire::{
    AcquireError, AcquisitionResult, AgentStrategy, DecisionOracle, GeminiOracle, Strategy,
    StrategyChain, StrategyOutcome,
};
pub use cache::{CacheEntry, CacheStore, MetadataCache};
pub use citekey::assign_citekeys;
pub use config::{Endpoints, FilenamePolicy, PipelineConfig};
pub use download::{DocumentValidator, DownloadError, RejectReason, SaveOutcome};
pub use metadata::{MetadataError, MetadataResolver, Resolution};
pub use pipeline::{BatchReport, BatchStats, Pipeline, PipelineError, PipelineEvent};
pub use record::{AcquisitionState, CandidateRecord, Record};
pub use report::{ReportError, write_bibliography, write_csv_report};
pub use similarity::{normalize_title, similarity};
