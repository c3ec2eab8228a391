//! Shared HTTP client construction policy.
//!
//! Every network collaborator (registry, open-access resolver, preprint search,
//! mirrors, abstract providers, decision oracle) builds its client here so
//! timeouts, compression, User-Agent and proxy handling stay consistent.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};
use thiserror::Error;
use tracing::warn;

/// Connect and read timeouts applied to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// TCP/TLS connect timeout.
    pub connect: Duration,
    /// Whole-request timeout.
    pub read: Duration,
}

impl HttpTimeouts {
    /// Timeouts for JSON API calls.
    pub const API: Self = Self {
        connect: Duration::from_secs(10),
        read: Duration::from_secs(30),
    };

    /// Timeouts for document and landing-page fetches.
    pub const DOCUMENT: Self = Self {
        connect: Duration::from_secs(20),
        read: Duration::from_secs(60),
    };

    /// Creates timeouts from whole seconds.
    #[must_use]
    pub fn from_secs(connect_secs: u64, read_secs: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect_secs),
            read: Duration::from_secs(read_secs),
        }
    }
}

/// Failure to construct an HTTP client.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    /// The builder panicked even with system proxy lookup disabled.
    #[error("HTTP client construction panicked for {client}")]
    Panicked {
        /// Name of the collaborator the client was for.
        client: String,
    },

    /// reqwest rejected the configuration.
    #[error("HTTP client construction failed for {client}: {source}")]
    Build {
        /// Name of the collaborator the client was for.
        client: String,
        /// Underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

/// Builds an HTTP client using the shared project policy.
///
/// `client_name` is only used for logging and errors.
///
/// # Errors
///
/// Returns [`ClientBuildError`] when the client cannot be constructed.
pub fn build_http_client(
    client_name: &str,
    user_agent: &str,
    timeouts: HttpTimeouts,
) -> Result<Client, ClientBuildError> {
    match try_build_client(user_agent, timeouts, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed environments panic when querying system proxy
            // settings; env proxies still apply on the fallback path.
            warn!(
                client = client_name,
                "HTTP client hit system proxy panic; using env-proxy fallback builder"
            );
            match try_build_client(user_agent, timeouts, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(ClientBuildError::Panicked {
                    client: client_name.to_string(),
                }),
                Err(BuildClientFailure::Build(source)) => Err(ClientBuildError::Build {
                    client: client_name.to_string(),
                    source,
                }),
            }
        }
        Err(BuildClientFailure::Build(source)) => Err(ClientBuildError::Build {
            client: client_name.to_string(),
            source,
        }),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    user_agent: &str,
    timeouts: HttpTimeouts,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let user_agent = user_agent.to_string();
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(user_agent, timeouts);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(user_agent: String, timeouts: HttpTimeouts) -> ClientBuilder {
    Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.read)
        .user_agent(user_agent)
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

/// Returns the lowercased MIME essence of a `Content-Type` header.
#[must_use]
pub fn content_type_essence(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client_with_api_timeouts() {
        let client = build_http_client("test", "paperbot-test", HttpTimeouts::API);
        assert!(client.is_ok());
    }

    #[test]
    fn test_http_timeouts_from_secs() {
        let timeouts = HttpTimeouts::from_secs(3, 7);
        assert_eq!(timeouts.connect, Duration::from_secs(3));
        assert_eq!(timeouts.read, Duration::from_secs(7));
        assert!(HttpTimeouts::DOCUMENT.read > HttpTimeouts::API.read);
    }

    #[test]
    fn test_env_proxy_for_unknown_scheme_is_none() {
        assert!(env_proxy_for_scheme("ftp").is_none());
    }
}
