//! Cache store for persisting service responses to disk
//!
//! Provides a `CacheStore` that keeps one file per cache key: a JSON envelope for
//! structured responses, or tab-delimited text for tabular ones. Entries never
//! expire; they are replaced wholesale when re-fetched or removed by hand.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::key::CacheKey;
use crate::table::Table;

/// Errors raised while reading or writing cache files
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed
    #[error("cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A JSON entry exists but cannot be decoded
    #[error("corrupt cache entry {path}: {source}")]
    CorruptJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A tabular entry exists but cannot be decoded or encoded
    #[error("corrupt tabular cache entry {path}: {source}")]
    CorruptTable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A stored response: structured JSON or a table
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Table(Table),
}

impl Payload {
    /// Whether the payload carries nothing worth caching
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Json(Value::Null) => true,
            Payload::Json(Value::Array(items)) => items.is_empty(),
            Payload::Json(Value::Object(map)) => map.is_empty(),
            Payload::Json(Value::String(s)) => s.is_empty(),
            Payload::Json(_) => false,
            Payload::Table(table) => table.is_empty(),
        }
    }

    /// Flattens the payload into a sequence of records
    ///
    /// Arrays are taken as-is, a single value becomes a one-element sequence,
    /// null becomes empty and tables yield one object per row.
    pub fn into_records(self) -> Vec<Value> {
        match self {
            Payload::Json(Value::Array(items)) => items,
            Payload::Json(Value::Null) => Vec::new(),
            Payload::Json(other) => vec![other],
            Payload::Table(table) => table.to_records(),
        }
    }
}

/// On-disk envelope for JSON entries
#[derive(Debug, Serialize, Deserialize)]
struct StoredJson {
    /// Canonical key text, kept for inspection since the file name is a hash
    key: String,
    /// When the entry was written
    cached_at: DateTime<Utc>,
    /// The stored response
    data: Value,
}

/// Result of reading from the cache
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored response
    pub payload: Payload,
    /// When the entry was written, if known
    pub cached_at: Option<DateTime<Utc>>,
}

/// Manages reading and writing cache entries for one service
///
/// Files are named by the SHA-256 of the cache key, so writers targeting
/// different keys never touch the same file. Two writers racing on the same
/// key both write the same content; the last one wins.
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

impl CacheStore {
    /// Creates a store under the XDG cache directory, one subdirectory per service
    ///
    /// Uses `~/.cache/bioquery/<service>/` on Linux, or the platform equivalent.
    /// Returns `None` if no home directory can be determined.
    pub fn new(service: &str) -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "bioquery")?;
        let cache_dir = project_dirs.cache_dir().join(service);
        Some(Self { cache_dir })
    }

    /// Creates a store rooted at a specific directory
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Directory holding this store's files
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn file_stem(key: &CacheKey) -> String {
        hex::encode(Sha256::digest(key.as_str().as_bytes()))
    }

    fn json_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.json", Self::file_stem(key)))
    }

    fn table_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}.tsv", Self::file_stem(key)))
    }

    /// Path of the existing file for `key`, if any
    pub fn path_for(&self, key: &CacheKey) -> Option<PathBuf> {
        [self.json_path(key), self.table_path(key)]
            .into_iter()
            .find(|path| path.exists())
    }

    /// Whether an entry exists for `key`
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.path_for(key).is_some()
    }

    /// Reads the entry for `key`
    ///
    /// Returns `Ok(None)` when nothing is stored and `Err` when a file exists
    /// but cannot be decoded.
    pub fn read(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let Some(path) = self.path_for(key) else {
            return Ok(None);
        };
        let content = fs::read_to_string(&path).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;

        if path.extension().is_some_and(|ext| ext == "tsv") {
            let table = Table::from_tsv(&content).map_err(|source| CacheError::CorruptTable {
                path: path.clone(),
                source,
            })?;
            let cached_at = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            return Ok(Some(CacheEntry {
                payload: Payload::Table(table),
                cached_at,
            }));
        }

        let stored: StoredJson =
            serde_json::from_str(&content).map_err(|source| CacheError::CorruptJson {
                path: path.clone(),
                source,
            })?;
        Ok(Some(CacheEntry {
            payload: Payload::Json(stored.data),
            cached_at: Some(stored.cached_at),
        }))
    }

    /// Writes `payload` under `key`, replacing any previous entry
    pub fn write(&self, key: &CacheKey, payload: &Payload) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir).map_err(|source| CacheError::Io {
            path: self.cache_dir.clone(),
            source,
        })?;

        let (path, stale, content) = match payload {
            Payload::Json(data) => {
                let path = self.json_path(key);
                let stored = StoredJson {
                    key: key.as_str().to_string(),
                    cached_at: Utc::now(),
                    data: data.clone(),
                };
                let content = serde_json::to_string_pretty(&stored).map_err(|source| {
                    CacheError::CorruptJson {
                        path: path.clone(),
                        source,
                    }
                })?;
                (path, self.table_path(key), content)
            }
            Payload::Table(table) => {
                let path = self.table_path(key);
                let content = table.to_tsv().map_err(|source| CacheError::CorruptTable {
                    path: path.clone(),
                    source,
                })?;
                (path, self.json_path(key), content)
            }
        };

        // an entry switching format must not leave the old file shadowing it
        if stale.exists() {
            if let Err(source) = fs::remove_file(&stale) {
                warn!(key = %key, path = %stale.display(), error = %source, "stale cache entry not removed");
                return Err(CacheError::Io { path: stale, source });
            }
        }

        fs::write(&path, content).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(key = %key, path = %path.display(), "cache entry written");
        Ok(())
    }

    /// Deletes the entry for `key`; returns whether anything was removed
    pub fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let Some(path) = self.path_for(key) else {
            return Ok(false);
        };
        fs::remove_file(&path).map_err(|source| CacheError::Io { path, source })?;
        Ok(true)
    }
}
