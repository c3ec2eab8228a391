//! Error types for cache persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while saving the cache. Loading never fails.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Creating the directory or writing the file failed.
    #[error("cannot write metadata cache {path}: {source}\n  Suggestion: Check permissions for the cache location")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The mapping could not be encoded.
    #[error("cannot encode metadata cache {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
