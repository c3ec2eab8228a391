//! Error types for the pipeline orchestrator.

use std::path::PathBuf;

use thiserror::Error;

use crate::acquire::AcquireError;
use crate::metadata::MetadataError;

/// Errors that abort a run. Per-record failures are never reported here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The output directory cannot be created.
    #[error("cannot create output directory {path}: {source}\n  Suggestion: Check that the path is writable or pass a different --output-dir")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metadata resolver could not be built.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The strategy chain could not be built.
    #[error(transparent)]
    Acquire(#[from] AcquireError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_error_names_path() {
        let err = PipelineError::Destination {
            path: PathBuf::from("/readonly/papers"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/readonly/papers"));
        assert!(msg.contains("Suggestion:"));
    }
}
