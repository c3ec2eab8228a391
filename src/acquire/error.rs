//! Error types for acquisition strategies.
//!
//! Every variant is recoverable at the chain level: a strategy that returns an
//! error is logged and the next strategy is tried.

use thiserror::Error;

use crate::download::DownloadError;
use crate::http::ClientBuildError;

/// Errors raised while attempting to acquire a document.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// HTTP client construction failed.
    #[error(transparent)]
    Client(#[from] ClientBuildError),

    /// Connection-level failure.
    #[error("{strategy}: request to {url} failed: {source}\n  Suggestion: Check your network connection; the chain continues with the next source")]
    Transport {
        /// Strategy that issued the request.
        strategy: &'static str,
        /// Requested URL.
        url: String,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The request exceeded its timeout.
    #[error("{strategy}: request to {url} timed out\n  Suggestion: The server may be overloaded; try again later")]
    Timeout {
        /// Strategy that issued the request.
        strategy: &'static str,
        /// Requested URL.
        url: String,
    },

    /// Non-success HTTP status other than not-found.
    #[error("{strategy}: HTTP {status} from {url}")]
    HttpStatus {
        /// Strategy that issued the request.
        strategy: &'static str,
        /// Requested URL.
        url: String,
        /// Status code.
        status: u16,
    },

    /// A JSON or Atom body could not be decoded.
    #[error("{strategy}: could not parse response from {url}: {reason}")]
    Parse {
        /// Strategy that issued the request.
        strategy: &'static str,
        /// Requested URL.
        url: String,
        /// Decoder message.
        reason: String,
    },

    /// Local storage failure while committing a document.
    #[error("{strategy}: {source}")]
    Storage {
        /// Strategy that produced the bytes.
        strategy: &'static str,
        /// Underlying storage error.
        #[source]
        source: DownloadError,
    },

    /// The decision oracle could not be reached or answered with an error.
    #[error("decision oracle failed: {reason}")]
    Oracle {
        /// Description of the failure.
        reason: String,
    },

    /// The browser session failed.
    #[error("browser session failed: {reason}\n  Suggestion: Check that the browser driver is installed and reachable")]
    Browser {
        /// Description of the failure.
        reason: String,
    },
}

impl AcquireError {
    /// Maps a reqwest error to [`AcquireError::Timeout`] or [`AcquireError::Transport`].
    #[must_use]
    pub fn transport(strategy: &'static str, url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                strategy,
                url: url.to_string(),
            }
        } else {
            Self::Transport {
                strategy,
                url: url.to_string(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    #[must_use]
    pub fn http_status(strategy: &'static str, url: &str, status: u16) -> Self {
        Self::HttpStatus {
            strategy,
            url: url.to_string(),
            status,
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(strategy: &'static str, url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Parse {
            strategy,
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Wraps a storage error.
    #[must_use]
    pub fn storage(strategy: &'static str, source: DownloadError) -> Self {
        Self::Storage { strategy, source }
    }

    /// Creates an oracle error.
    #[must_use]
    pub fn oracle(reason: impl Into<String>) -> Self {
        Self::Oracle {
            reason: reason.into(),
        }
    }

    /// Creates a browser error.
    #[must_use]
    pub fn browser(reason: impl Into<String>) -> Self {
        Self::Browser {
            reason: reason.into(),
        }
    }
}
