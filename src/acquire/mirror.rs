//! Tertiary mirror discovery.
//!
//! The working mirror host is discovered once per run and reused. It is only
//! forgotten when the host itself stops answering (a re-probe of its root
//! fails), so the next record triggers a fresh discovery. Error statuses for a
//! single document leave the mirror in place.

use std::time::Duration;

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::scrape::find_mirror_links;
use crate::config::PipelineConfig;

/// Discovers and caches the tertiary mirror base URL.
#[derive(Debug)]
pub struct MirrorDirectory {
    client: Client,
    directory_url: String,
    fallbacks: Vec<String>,
    host_marker: String,
    fixed: Option<String>,
    probe_timeout: Duration,
    resolved: Mutex<Option<String>>,
}

impl MirrorDirectory {
    /// Creates a directory from the run configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig, client: Client) -> Self {
        let endpoints = &config.endpoints;
        Self {
            client,
            directory_url: endpoints.scihub_directory.clone(),
            fallbacks: endpoints.scihub_fallbacks.clone(),
            host_marker: endpoints.scihub_host_marker.clone(),
            fixed: endpoints
                .scihub_override
                .as_deref()
                .map(|m| m.trim_end_matches('/').to_string()),
            probe_timeout: config.mirror_probe_timeout,
            resolved: Mutex::new(None),
        }
    }

    /// Returns the mirror to use, discovering one on first call.
    ///
    /// A configured override is returned as-is without probing.
    pub async fn current(&self) -> Option<String> {
        if let Some(fixed) = &self.fixed {
            return Some(fixed.clone());
        }
        let mut resolved = self.resolved.lock().await;
        if resolved.is_none() {
            *resolved = self.discover().await;
        }
        resolved.clone()
    }

    /// Forgets the discovered mirror so the next call rediscovers.
    pub async fn invalidate(&self) {
        if self.fixed.is_some() {
            return;
        }
        let mut resolved = self.resolved.lock().await;
        if let Some(previous) = resolved.take() {
            debug!(mirror = %previous, "forgetting mirror");
        }
    }

    /// Re-probes `mirror` after a failed request and forgets it if its root
    /// no longer answers. Returns `true` when the mirror was dropped.
    pub async fn recheck(&self, mirror: &str) -> bool {
        if self.fixed.is_some() || self.probe(mirror).await {
            return false;
        }
        let mut resolved = self.resolved.lock().await;
        if resolved.as_deref() != Some(mirror) {
            return false;
        }
        debug!(%mirror, "mirror stopped answering; forgetting it");
        *resolved = None;
        true
    }

    #[tracing::instrument(skip(self), fields(directory = %self.directory_url))]
    async fn discover(&self) -> Option<String> {
        let mut candidates = self.directory_links().await;
        if candidates.is_empty() {
            candidates.clone_from(&self.fallbacks);
        }

        for candidate in &candidates {
            if self.probe(candidate).await {
                info!(mirror = %candidate, "using mirror");
                return Some(candidate.clone());
            }
        }

        let fallback = self.fallbacks.first().cloned();
        warn!(
            fallback = fallback.as_deref().unwrap_or(""),
            "no mirror answered; consider --scihub-mirror or a proxy"
        );
        fallback
    }

    async fn directory_links(&self) -> Vec<String> {
        let response = match self.client.get(&self.directory_url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(status = response.status().as_u16(), "mirror directory unavailable");
                return Vec::new();
            }
            Err(error) => {
                debug!(%error, "mirror directory unreachable");
                return Vec::new();
            }
        };
        match response.text().await {
            Ok(html) => find_mirror_links(&html, &self.host_marker),
            Err(error) => {
                debug!(%error, "mirror directory body unreadable");
                Vec::new()
            }
        }
    }

    async fn probe(&self, candidate: &str) -> bool {
        debug!(mirror = candidate, "probing mirror");
        match self
            .client
            .get(candidate)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().as_u16() == 200,
            Err(error) => {
                debug!(mirror = candidate, %error, "mirror probe failed");
                false
            }
        }
    }
}
