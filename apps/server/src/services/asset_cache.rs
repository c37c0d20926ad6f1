// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TTL-bounded asset cache backed by cacache.
//!
//! The cache maps asset ids to entries of `{file_path, expire_at}`; the
//! extracted files themselves live next to the index. Eviction happens on
//! access: callers re-validate both the TTL and the file's existence, and
//! remove the file system side themselves.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// One cached asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub file_path: PathBuf,
    /// Expiry as seconds since the epoch.
    pub expire_at: u64,
}

/// Keyed, disk-backed cache index.
#[derive(Debug, Clone)]
pub struct AssetCache {
    index_dir: PathBuf,
}

impl AssetCache {
    pub async fn new(cache_dir: &Path) -> Self {
        let index_dir = cache_dir.join("index");
        if let Err(e) = tokio::fs::create_dir_all(&index_dir).await {
            tracing::warn!(error = %e, path = %index_dir.display(), "failed to create cache directory");
        }
        Self { index_dir }
    }

    /// The entry stored under `id`, if any.
    pub async fn get(&self, id: &str) -> Option<CacheEntry> {
        match cacache::read(&self.index_dir, id).await {
            Ok(data) => match serde_json::from_slice(&data) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(id, error = %e, "dropping unreadable cache entry");
                    let _ = cacache::remove(&self.index_dir, id).await;
                    None
                }
            },
            Err(cacache::Error::EntryNotFound(_, _)) => None,
            Err(e) => {
                tracing::warn!(id, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Record `file_path` under `id`, expiring after `ttl`.
    pub async fn add(
        &self,
        id: &str,
        file_path: &Path,
        ttl: Duration,
    ) -> Result<(), GenerationError> {
        let entry = CacheEntry {
            file_path: file_path.to_path_buf(),
            expire_at: now_epoch() + ttl.as_secs(),
        };
        let data = serde_json::to_vec(&entry)
            .map_err(|e| GenerationError::Cache(e.to_string()))?;
        cacache::write(&self.index_dir, id, &data).await?;
        tracing::debug!(id, path = %file_path.display(), "cached asset entry");
        Ok(())
    }

    /// Remove the entry under `id`; the referenced file is left to the
    /// caller.
    pub async fn delete(&self, id: &str) {
        if let Err(e) = cacache::remove(&self.index_dir, id).await {
            tracing::debug!(id, error = %e, "cache delete failed");
        }
    }
}

/// Seconds since the epoch.
pub fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
