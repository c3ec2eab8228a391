//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Resolve bibliographic records and acquire their open-access documents.
///
/// Records come from a JSON file produced by a search scraper, or from bare
/// DOIs. Each record is matched against the registry, given a citekey, and
/// fetched through an ordered chain of document sources.
#[derive(Parser, Debug)]
#[command(name = "paperbot")]
#[command(author, version, about)]
pub struct Args {
    /// JSON array of candidate records ({"title", "authors", "year", "link", "pdf_link", ...})
    #[arg(long, value_name = "FILE")]
    pub records: Option<PathBuf>,

    /// DOI to resolve and download (repeatable)
    #[arg(long = "doi", value_name = "DOI")]
    pub dois: Vec<String>,

    /// File with one DOI per line
    #[arg(long, value_name = "FILE")]
    pub doi_file: Option<PathBuf>,

    /// Directory for documents and reports
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Stop after this many successful downloads
    #[arg(long, value_name = "N")]
    pub max_downloads: Option<usize>,

    /// Metadata cache file
    #[arg(long, value_name = "FILE")]
    pub cache_path: Option<PathBuf>,

    /// Skip registry resolution and use records as given
    #[arg(long)]
    pub skip_metadata: bool,

    /// Resolve and write reports without downloading documents
    #[arg(long)]
    pub no_download: bool,

    /// Name documents after their DOI instead of their citekey
    #[arg(long)]
    pub use_doi_as_filename: bool,

    /// Fixed tertiary mirror URL (disables mirror discovery)
    #[arg(long, value_name = "URL")]
    pub scihub_mirror: Option<String>,

    /// Secondary mirror URL prefix
    #[arg(long, value_name = "URL")]
    pub scidb_mirror: Option<String>,

    /// Contact address for the registry polite pool
    #[arg(long, value_name = "EMAIL")]
    pub mailto: Option<String>,

    /// Config file (default: $XDG_CONFIG_HOME/paperbot/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// True when any input source was given.
    #[must_use]
    pub fn has_input(&self) -> bool {
        self.records.is_some() || !self.dois.is_empty() || self.doi_file.is_some()
    }
}
