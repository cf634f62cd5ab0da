use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::util::write_atomic;

/// Read-through cache mapping a key (an article URL) to the bytes produced
/// for it.
///
/// Entries are immutable: once a key has a value it is returned verbatim on
/// every later lookup and never expires. Two keys whose digests collide share
/// an entry.
#[derive(Debug, Clone)]
pub enum Cache {
    /// One file per key under a directory
    Disk(DiskCache),
    /// Never stores anything; every lookup is a miss
    NoOp,
}

impl Cache {
    /// Disk cache rooted at `dir`, or [`Cache::NoOp`] when no directory is
    /// configured.
    ///
    /// The directory is created if needed. A directory that cannot be created
    /// is not fatal: the cache degrades to pass-through with a warning.
    pub async fn from_dir(dir: Option<PathBuf>) -> Self {
        let Some(dir) = dir else {
            tracing::debug!("No cache directory configured, caching disabled");
            return Cache::NoOp;
        };

        match tokio::fs::create_dir_all(&dir).await {
            Ok(()) => {
                tracing::debug!(dir = %dir.display(), "Using content cache");
                Cache::Disk(DiskCache::new(dir))
            }
            Err(e) => {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %e,
                    "Failed to create cache directory, caching disabled"
                );
                Cache::NoOp
            }
        }
    }

    /// Returns the cached bytes for `key`, or runs `miss` and caches its
    /// result.
    ///
    /// Errors from `miss` are returned as is and nothing is written. Cache
    /// I/O failures are logged and never surface: an unreadable entry is
    /// treated as a miss and a failed write still returns the computed bytes.
    ///
    /// Concurrent misses for the same key both run `miss` and both write;
    /// the entry ends up holding one of the two values, never a mix.
    pub async fn with_cache<F, Fut, E>(&self, key: &str, miss: F) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        match self {
            Cache::NoOp => miss().await,
            Cache::Disk(disk) => disk.with_cache(key, miss).await,
        }
    }
}

/// Content-addressed directory: each entry lives at `dir/<sha256(key)>`.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the entry for `key`, whether or not it exists.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(digest_key(key))
    }

    async fn with_cache<F, Fut, E>(&self, key: &str, miss: F) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        let path = self.entry_path(key);

        let persist = match tokio::fs::read(&path).await {
            Ok(cached) => {
                tracing::debug!(key, path = %path.display(), "Cache hit");
                return Ok(Bytes::from(cached));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => {
                tracing::warn!(
                    key,
                    path = %path.display(),
                    error = %e,
                    "Failed to read cache entry, bypassing cache"
                );
                false
            }
        };

        let value = miss().await?;

        if persist {
            match write_atomic(&path, &value).await {
                Ok(()) => tracing::debug!(key, path = %path.display(), "Cached entry"),
                Err(e) => tracing::warn!(
                    key,
                    path = %path.display(),
                    error = %e,
                    "Failed to write cache entry"
                ),
            }
        }

        Ok(value)
    }
}

/// Lowercase hex SHA-256 of the key (64 characters).
fn digest_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}
