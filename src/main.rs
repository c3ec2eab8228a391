//! CLI entry point for paperbot.

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paperbot_core::http::HttpTimeouts;
use paperbot_core::report::{BIBLIOGRAPHY_FILE, CSV_REPORT_FILE};
use paperbot_core::{
    AcquisitionResult, BatchStats, CandidateRecord, FilenamePolicy, Pipeline, PipelineConfig,
    PipelineEvent, Record, write_bibliography, write_csv_report,
};
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::{FileConfig, load_config};
use cli::Args;

const DEFAULT_OUTPUT_DIR: &str = "papers";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let loaded = load_config(args.config.as_deref())?;

    init_tracing(&args, &loaded.config);
    debug!(?args, "CLI arguments parsed");
    if loaded.loaded_from_file {
        info!(path = ?loaded.path, "Loaded configuration file");
    }

    let records = load_inputs(&args).await?;
    if records.is_empty() {
        info!("No input provided. Pass --records <file.json>, --doi <DOI> or --doi-file <file>.");
        return Ok(());
    }
    info!(records = records.len(), "Loaded input records");

    let config = build_pipeline_config(&args, &loaded.config);
    let output_dir = config.output_dir.clone();
    let pipeline = Pipeline::from_config(config).context("Failed to initialize the pipeline")?;

    let bar = progress_bar(!args.quiet && io::stderr().is_terminal());
    let report = pipeline
        .run_with_progress(records, |event| match event {
            PipelineEvent::AcquisitionStarted { eligible } => {
                bar.set_length(u64::try_from(eligible).unwrap_or(u64::MAX));
            }
            PipelineEvent::Acquired { record, result } => {
                bar.set_message(record.citekey().unwrap_or_default().to_string());
                bar.inc(1);
                if let AcquisitionResult::Exhausted { attempted } = result {
                    debug!(attempted, title = %record.title_str(), "not downloaded");
                }
            }
            PipelineEvent::Resolved { .. } => {}
        })
        .await?;
    bar.finish_and_clear();

    write_reports(&report.records, &output_dir).await?;
    print_summary(&report.stats, &output_dir);
    Ok(())
}

/// Priority: `RUST_LOG` > `--quiet` > `-v`/`-vv` > config verbosity > info.
fn init_tracing(args: &Args, file: &FileConfig) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file
                .verbosity
                .map_or("info", app_config::VerbositySetting::filter_directive),
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Command-line value > config file > built-in default.
fn build_pipeline_config(args: &Args, file: &FileConfig) -> PipelineConfig {
    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| file.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let mut config = PipelineConfig::new(output_dir);

    config.max_downloads = args.max_downloads.or(file.max_downloads);
    if let Some(cache_path) = args.cache_path.clone().or_else(|| file.cache_path.clone()) {
        config.cache_path = cache_path;
    }
    if let Some(mailto) = args.mailto.clone().or_else(|| file.mailto.clone()) {
        config.mailto = mailto;
    }
    config.semantic_scholar_api_key = file.semantic_scholar_api_key.clone();
    config.endpoints.scihub_override = args
        .scihub_mirror
        .clone()
        .or_else(|| file.scihub_mirror.clone());
    if let Some(scidb) = args.scidb_mirror.clone().or_else(|| file.scidb_mirror.clone()) {
        config.endpoints.scidb = scidb;
    }
    if args.use_doi_as_filename || file.use_doi_as_filename.unwrap_or(false) {
        config.filename_policy = FilenamePolicy::Identifier;
    }
    if let Some(delay) = file.query_delay_ms {
        config.query_delay = Duration::from_millis(delay);
    }
    if file.connect_timeout_secs.is_some() || file.read_timeout_secs.is_some() {
        let defaults = HttpTimeouts::DOCUMENT;
        config.document_timeouts = HttpTimeouts {
            connect: file
                .connect_timeout_secs
                .map_or(defaults.connect, Duration::from_secs),
            read: file
                .read_timeout_secs
                .map_or(defaults.read, Duration::from_secs),
        };
    }
    if let Some(bytes) = file.min_document_bytes {
        config.min_document_bytes = bytes;
    }
    config.skip_metadata = args.skip_metadata;
    config.skip_download = args.no_download;
    config
}

/// Reads every input source into records, in order: records file, `--doi`, `--doi-file`.
async fn load_inputs(args: &Args) -> Result<Vec<Record>> {
    let mut records = Vec::new();

    if let Some(path) = &args.records {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Cannot read records file '{}'", path.display()))?;
        let candidates: Vec<CandidateRecord> = serde_json::from_str(&raw).with_context(|| {
            format!(
                "Records file '{}' is not a JSON array of records",
                path.display()
            )
        })?;
        records.extend(candidates.into_iter().map(Record::from));
    }

    records.extend(args.dois.iter().filter_map(|doi| doi_record(doi)));

    if let Some(path) = &args.doi_file {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Cannot read DOI file '{}'", path.display()))?;
        let before = records.len();
        records.extend(raw.lines().filter_map(doi_record));
        if records.len() == before {
            warn!(path = %path.display(), "DOI file contained no identifiers");
        }
    }

    if args.has_input() && records.is_empty() {
        bail!("Input was given but contained no records");
    }
    Ok(records)
}

fn doi_record(line: &str) -> Option<Record> {
    let doi = line.trim();
    if doi.is_empty() || doi.starts_with('#') {
        return None;
    }
    Some(Record::with_identifier(doi))
}

async fn write_reports(records: &[Record], output_dir: &Path) -> Result<()> {
    let bib_path = output_dir.join(BIBLIOGRAPHY_FILE);
    write_bibliography(records, &bib_path)
        .await
        .context("Failed to write the bibliography")?;
    let csv_path = output_dir.join(CSV_REPORT_FILE);
    write_csv_report(records, &csv_path)
        .await
        .context("Failed to write the CSV report")?;
    Ok(())
}

fn progress_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn print_summary(stats: &BatchStats, output_dir: &Path) {
    println!(
        "Processed {} records: {} resolved from cache, {} from the registry, {} unmatched",
        stats.total, stats.cached, stats.matched, stats.unmatched
    );
    println!(
        "Downloaded {} of {} eligible ({} exhausted, {} skipped by budget)",
        stats.downloaded, stats.eligible, stats.exhausted, stats.skipped_by_budget
    );
    for (source, count) in &stats.per_source {
        println!("  {source}: {count}");
    }
    println!("Output: {}", output_dir.display());
}
