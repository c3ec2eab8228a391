//! Error types for local document storage.

use std::path::PathBuf;

use thiserror::Error;

/// Storage failures while committing a document.
///
/// Rejected content is not an error; see [`super::SaveOutcome`].
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The document could not be written, moved or read back.
    #[error(
        "cannot store document at {path}: {source}\n  Suggestion: Check that the output directory exists and is writable"
    )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
