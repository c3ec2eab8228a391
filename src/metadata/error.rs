//! Error types for registry and abstract-provider calls.
//!
//! Messages follow the What/Why/Fix pattern used across the project. None of
//! these are fatal to a batch: the resolver logs them and treats the step as
//! "no match".

use thiserror::Error;

use crate::http::ClientBuildError;

/// Errors raised while talking to metadata services.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The HTTP client for a service could not be built.
    #[error(transparent)]
    Client(#[from] ClientBuildError),

    /// The request never produced a response (DNS, connect, timeout).
    #[error("cannot reach {service} for '{query}': {source}\n  Suggestion: Check your network connection")]
    Transport {
        /// Service name (`crossref`, `semantic-scholar`).
        service: &'static str,
        /// Title or identifier being looked up.
        query: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status.
    #[error("{service} returned HTTP {status} for '{query}'\n  Suggestion: {suggestion}")]
    HttpStatus {
        /// Service name.
        service: &'static str,
        /// Title or identifier being looked up.
        query: String,
        /// HTTP status code.
        status: u16,
        /// How to fix the issue.
        suggestion: &'static str,
    },

    /// The body could not be decoded.
    #[error("unexpected {service} response format for '{query}': {reason}")]
    Parse {
        /// Service name.
        service: &'static str,
        /// Title or identifier being looked up.
        query: String,
        /// Decoder message.
        reason: String,
    },

    /// The contact address cannot be sent in a query string.
    #[error("invalid mailto '{mailto}': contains control characters\n  Suggestion: Use a plain email address")]
    InvalidMailto {
        /// Rejected address.
        mailto: String,
    },
}

impl MetadataError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(service: &'static str, query: &str, source: reqwest::Error) -> Self {
        Self::Transport {
            service,
            query: query.to_string(),
            source,
        }
    }

    /// Creates an HTTP status error with a status-specific suggestion.
    #[must_use]
    pub fn http_status(service: &'static str, query: &str, status: u16) -> Self {
        let suggestion = match status {
            404 => "The identifier is unknown to this service",
            429 => "Rate limit exceeded; slow down queries or try again later",
            s if s >= 500 => "The service is unavailable; try again later",
            _ => "Check the request and try again",
        };
        Self::HttpStatus {
            service,
            query: query.to_string(),
            status,
            suggestion,
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(service: &'static str, query: &str, reason: impl std::fmt::Display) -> Self {
        Self::Parse {
            service,
            query: query.to_string(),
            reason: reason.to_string(),
        }
    }
}
