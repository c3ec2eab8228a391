//! Immutable run configuration threaded through every pipeline component.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::http::HttpTimeouts;

/// Default registry base URL.
pub const DEFAULT_CROSSREF_URL: &str = "https://api.crossref.org";
/// Default open-access resolver base URL.
pub const DEFAULT_UNPAYWALL_URL: &str = "https://api.unpaywall.org";
/// Default identifier resolver base URL.
pub const DEFAULT_DOI_URL: &str = "https://doi.org";
/// Default preprint search base URL.
pub const DEFAULT_ARXIV_URL: &str = "https://export.arxiv.org";
/// Default abstract provider base URL.
pub const DEFAULT_SEMANTIC_SCHOLAR_URL: &str = "https://api.semanticscholar.org";
/// Default secondary mirror URL prefix (identifier is appended).
pub const DEFAULT_SCIDB_URL: &str = "https://annas-archive.org/scidb/";
/// Default page listing tertiary mirror hosts.
pub const DEFAULT_SCIHUB_DIRECTORY_URL: &str = "https://sci-hub.now.sh/";
/// Tertiary mirror hosts used when discovery yields nothing.
pub const DEFAULT_SCIHUB_FALLBACK_MIRRORS: [&str; 3] =
    ["https://sci-hub.st", "https://sci-hub.se", "https://sci-hub.ru"];

/// Substring identifying tertiary mirror hosts on the directory page.
pub const DEFAULT_SCIHUB_HOST_MARKER: &str = "sci-hub.";

/// Default cache location relative to the working directory.
pub const DEFAULT_CACHE_PATH: &str = "cache/crossref_metadata_cache.json";
/// Entries older than this are treated as absent.
pub const DEFAULT_CACHE_HORIZON: Duration = Duration::from_secs(365 * 24 * 60 * 60);
/// Pause between registry queries.
pub const DEFAULT_QUERY_DELAY: Duration = Duration::from_millis(500);
/// Smallest document accepted by the validator.
pub const DEFAULT_MIN_DOCUMENT_BYTES: u64 = 1024;
/// Largest document body read from the network.
pub const MAX_DOCUMENT_BYTES: u64 = 200 * 1024 * 1024;
/// Timeout for probing a mirror host during discovery.
pub const DEFAULT_MIRROR_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound of the random pause before scraping a tertiary mirror page.
pub const DEFAULT_MIRROR_JITTER: Duration = Duration::from_secs(3);

/// Base URLs of every external collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub crossref: String,
    pub unpaywall: String,
    pub doi: String,
    pub arxiv: String,
    pub semantic_scholar: String,
    pub scidb: String,
    pub scihub_directory: String,
    pub scihub_fallbacks: Vec<String>,
    /// Substring a directory link must contain to count as a mirror host.
    pub scihub_host_marker: String,
    /// Fixed tertiary mirror; skips discovery when set.
    pub scihub_override: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            crossref: DEFAULT_CROSSREF_URL.to_string(),
            unpaywall: DEFAULT_UNPAYWALL_URL.to_string(),
            doi: DEFAULT_DOI_URL.to_string(),
            arxiv: DEFAULT_ARXIV_URL.to_string(),
            semantic_scholar: DEFAULT_SEMANTIC_SCHOLAR_URL.to_string(),
            scidb: DEFAULT_SCIDB_URL.to_string(),
            scihub_directory: DEFAULT_SCIHUB_DIRECTORY_URL.to_string(),
            scihub_fallbacks: DEFAULT_SCIHUB_FALLBACK_MIRRORS
                .iter()
                .map(ToString::to_string)
                .collect(),
            scihub_host_marker: DEFAULT_SCIHUB_HOST_MARKER.to_string(),
            scihub_override: None,
        }
    }
}

/// How saved documents are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilenamePolicy {
    /// `<citekey>.pdf`, falling back to the title.
    #[default]
    Citekey,
    /// Percent-encoded identifier.
    Identifier,
}

/// Run configuration. Built once, shared by reference.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    /// Maximum number of successful acquisitions; `None` is unbounded.
    pub max_downloads: Option<usize>,
    pub cache_path: PathBuf,
    pub cache_horizon: Duration,
    pub query_delay: Duration,
    pub api_timeouts: HttpTimeouts,
    pub document_timeouts: HttpTimeouts,
    pub min_document_bytes: u64,
    pub filename_policy: FilenamePolicy,
    pub mailto: String,
    pub semantic_scholar_api_key: Option<String>,
    pub mirror_probe_timeout: Duration,
    pub mirror_jitter: Duration,
    pub skip_metadata: bool,
    pub skip_download: bool,
    pub endpoints: Endpoints,
}

impl PipelineConfig {
    /// Creates a configuration with defaults writing into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_downloads: None,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            cache_horizon: DEFAULT_CACHE_HORIZON,
            query_delay: DEFAULT_QUERY_DELAY,
            api_timeouts: HttpTimeouts::API,
            document_timeouts: HttpTimeouts::DOCUMENT,
            min_document_bytes: DEFAULT_MIN_DOCUMENT_BYTES,
            filename_policy: FilenamePolicy::default(),
            mailto: "paperbot@example.org".to_string(),
            semantic_scholar_api_key: None,
            mirror_probe_timeout: DEFAULT_MIRROR_PROBE_TIMEOUT,
            mirror_jitter: DEFAULT_MIRROR_JITTER,
            skip_metadata: false,
            skip_download: false,
            endpoints: Endpoints::default(),
        }
    }

    /// Configuration for tests: every endpoint points at `base_url`, delays are zero.
    #[must_use]
    pub fn for_mock_server(output_dir: impl Into<PathBuf>, base_url: &str) -> Self {
        let mut config = Self::new(output_dir);
        config.query_delay = Duration::ZERO;
        config.mirror_jitter = Duration::ZERO;
        config.mirror_probe_timeout = Duration::from_secs(2);
        config.endpoints = Endpoints {
            crossref: base_url.to_string(),
            unpaywall: base_url.to_string(),
            doi: base_url.to_string(),
            arxiv: base_url.to_string(),
            semantic_scholar: base_url.to_string(),
            scidb: format!("{base_url}/scidb/"),
            scihub_directory: format!("{base_url}/mirrors"),
            scihub_fallbacks: vec![format!("{base_url}/scihub")],
            scihub_host_marker: base_url.to_string(),
            scihub_override: None,
        };
        config
    }

    /// Destination directory for documents.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
