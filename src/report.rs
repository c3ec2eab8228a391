//! Run artifacts: the combined bibliography and the tabular report.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metadata::BibEntry;
use crate::record::Record;

/// File name of the combined bibliography inside the output directory.
pub const BIBLIOGRAPHY_FILE: &str = "references.bib";
/// File name of the tabular report inside the output directory.
pub const CSV_REPORT_FILE: &str = "result.csv";

const CSV_HEADER: [&str; 9] = [
    "Name",
    "Citekey",
    "Link",
    "Identifier",
    "Downloaded",
    "Source",
    "Year",
    "Journal",
    "Authors",
];

/// Errors raised while writing reports.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot write report {path}: {source}\n  Suggestion: Check permissions for the output directory")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode CSV report {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Renders every attached entry re-keyed to its record's citekey, in batch order.
///
/// Records without an entry are left out; unparsable entries are skipped with
/// a warning.
#[must_use]
pub fn render_bibliography(records: &[Record]) -> String {
    render_entries(records).0
}

fn render_entries(records: &[Record]) -> (String, usize) {
    let mut out = String::new();
    let mut entries = 0;
    for record in records {
        let Some(raw) = record.bibtex.as_deref() else {
            continue;
        };
        let Some(entry) = BibEntry::parse(raw) else {
            warn!(title = %record.title_str(), "skipping unparsable BibTeX entry");
            continue;
        };
        let entry = match record.citekey() {
            Some(key) => entry.with_key(key),
            None => entry,
        };
        if entries > 0 {
            out.push('\n');
        }
        out.push_str(&entry.render());
        entries += 1;
    }
    (out, entries)
}

/// Writes the combined bibliography to `path`. Returns the number of entries.
///
/// # Errors
///
/// Returns [`ReportError::Io`] when the file cannot be written.
#[tracing::instrument(skip(records), fields(path = %path.display()))]
pub async fn write_bibliography(records: &[Record], path: &Path) -> Result<usize, ReportError> {
    let (rendered, entries) = render_entries(records);
    tokio::fs::write(path, rendered)
        .await
        .map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    info!(entries, "bibliography written");
    Ok(entries)
}

fn csv_row(record: &Record) -> [String; 9] {
    let state = record.acquisition();
    [
        record.title_str().to_string(),
        record.citekey().unwrap_or_default().to_string(),
        record.origin_link.clone().unwrap_or_default(),
        record.identifier.clone().unwrap_or_default(),
        state.is_downloaded().to_string(),
        state.source().unwrap_or_default().to_string(),
        record.year.clone().unwrap_or_default(),
        record.journal.clone().unwrap_or_default(),
        record.authors_joined(),
    ]
}

/// Encodes one row per record under the fixed header.
///
/// # Errors
///
/// Returns [`csv::Error`] when a row cannot be encoded.
pub fn render_csv_report(records: &[Record]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for record in records {
        writer.write_record(csv_row(record))?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Writes the tabular report to `path`.
///
/// # Errors
///
/// Returns [`ReportError`] when encoding or writing fails.
#[tracing::instrument(skip(records), fields(path = %path.display()))]
pub async fn write_csv_report(records: &[Record], path: &Path) -> Result<(), ReportError> {
    let encoded = render_csv_report(records).map_err(|source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    tokio::fs::write(path, encoded)
        .await
        .map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(rows = records.len(), "CSV report written");
    Ok(())
}
