//! JSON persistence for [`MetadataCache`].

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{CacheError, MetadataCache};

/// Loads and saves the cache file at a fixed path.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the mapping. Missing, unreadable or corrupt files yield an empty cache.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> MetadataCache {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("no metadata cache file yet");
                return MetadataCache::new();
            }
            Err(error) => {
                warn!(%error, "metadata cache unreadable; starting empty");
                return MetadataCache::new();
            }
        };
        match serde_json::from_str::<MetadataCache>(&raw) {
            Ok(cache) => {
                info!(entries = cache.len(), "metadata cache loaded");
                cache
            }
            Err(error) => {
                warn!(%error, "metadata cache corrupt; starting empty");
                MetadataCache::new()
            }
        }
    }

    /// Rewrites the whole mapping, creating the containing directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the directory or file cannot be written.
    #[tracing::instrument(skip(self, cache), fields(path = %self.path.display(), entries = cache.len()))]
    pub async fn save(&self, cache: &MetadataCache) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::io(parent, e))?;
        }
        let encoded = serde_json::to_string_pretty(cache).map_err(|source| CacheError::Encode {
            path: self.path.clone(),
            source,
        })?;
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|e| CacheError::io(&self.path, e))?;
        debug!("metadata cache saved");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, now_timestamp};

    #[tokio::test]
    async fn test_round_trip_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("nested/cache/metadata.json"));

        let mut cache = MetadataCache::new();
        cache.insert(
            "deeplearningsurvey",
            CacheEntry {
                timestamp: now_timestamp(),
                identifier: Some("10.1000/xyz".to_string()),
                authors: Some("Smith, John; Doe, Jane".to_string()),
                bibtex: Some("@article{k, title={Deep Learning Survey}}".to_string()),
                normalized_title: Some("deeplearningsurvey".to_string()),
            },
        );
        cache.insert(
            "unmatched",
            CacheEntry {
                timestamp: 12.25,
                identifier: None,
                authors: None,
                bibtex: None,
                normalized_title: None,
            },
        );

        store.save(&cache).await.unwrap();
        let loaded = store.load().await;
        assert_eq!(loaded, cache);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("absent.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        assert!(CacheStore::new(&path).load().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_wrong_shape_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, "[1, 2, 3]").await.unwrap();
        assert!(CacheStore::new(&path).load().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_rewrites_full_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache.json"));
        let mut first = MetadataCache::new();
        first.insert(
            "a",
            CacheEntry {
                timestamp: 1.0,
                identifier: None,
                authors: None,
                bibtex: None,
                normalized_title: None,
            },
        );
        store.save(&first).await.unwrap();
        store.save(&MetadataCache::new()).await.unwrap();
        assert!(store.load().await.is_empty());
    }
}
