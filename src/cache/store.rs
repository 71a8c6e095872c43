//! Get-or-produce cache backed by one JSON file per entry
//!
//! Entries are keyed by a digest of the canonical JSON of the request
//! parameters and stored alongside those parameters, so a read is only a hit
//! when the stored parameters equal the requested ones. Files older than the
//! configured expiration are swept on every lookup.
//!
//! Two processes missing on the same key may both run the producer and both
//! write; the last writer wins. Locking only guarantees that no reader ever
//! sees a partially written file.

use std::fs;
use std::future::Future;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use super::error::StoreError;
use super::lock::{with_dir_lock, with_file_lock, AccessMode};
use crate::config::CacheConfig;

/// Request parameters identifying one cache entry
pub type Params = Map<String, Value>;

/// Why a producer could not supply data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProduceError {
    /// The parameters do not describe a valid request
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The underlying data source failed
    #[error("Data source unavailable: {0}")]
    Unavailable(String),
}

/// Supplies fresh data on a cache miss.
///
/// May be invoked concurrently and redundantly for the same parameters by
/// different processes.
pub trait Producer {
    fn produce(&self, params: &Params)
        -> impl Future<Output = Result<Value, ProduceError>> + Send;
}

/// On-disk layout of a cache entry
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<D, P> {
    data: D,
    params: P,
}

/// Computes the cache key for `params`: hex SHA-256 of their canonical JSON.
pub fn cache_key(params: &Params) -> Result<String, serde_json::Error> {
    let canonical = serde_json_canonicalizer::to_vec(params)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// Memoizes a producer's results on disk
#[derive(Debug)]
pub struct CacheStore<P> {
    /// Directory where entry files are stored
    cache_dir: PathBuf,
    /// Maximum age of an entry file
    expiration: Duration,
    /// Source of fresh data
    producer: P,
    /// Message describing the most recent producer failure
    last_error: Option<String>,
}

impl<P> CacheStore<P> {
    /// Creates a store for the configured directory, creating it if missing.
    ///
    /// A directory that cannot be created is logged; every lookup then
    /// degrades to a miss.
    pub fn new(config: &CacheConfig, producer: P) -> Self {
        if let Err(source) = fs::create_dir_all(&config.cache_dir) {
            let err = StoreError::DirectoryCreate {
                path: config.cache_dir.clone(),
                source,
            };
            warn!(error = %err, "cache directory unavailable");
        }
        Self {
            cache_dir: config.cache_dir.clone(),
            expiration: config.expiration,
            producer,
            last_error: None,
        }
    }

    /// The directory holding entry files
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The wrapped producer
    pub fn producer(&self) -> &P {
        &self.producer
    }

    /// Message from the most recent failed produce, if the last one failed
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Deletes entry files older than the expiration.
    ///
    /// Runs under the cache directory lock where the platform can lock a
    /// directory, and unlocked otherwise. Returns the number of files
    /// removed. Only entry files are considered; other files and
    /// sub-directories are left alone.
    pub fn clean(&self) -> usize {
        let removed = with_dir_lock(&self.cache_dir, |dir| sweep_expired(dir, self.expiration))
            .unwrap_or_else(|e| {
                debug!(error = %e, "directory lock unavailable, sweeping unlocked");
                sweep_expired(&self.cache_dir, self.expiration)
            });
        if removed > 0 {
            debug!(removed, dir = %self.cache_dir.display(), "swept expired entries");
        }
        removed
    }

    /// Returns the path of the entry file for `key`
    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.txt", key))
    }

    /// Reads the entry for `key` if it was stored for exactly `params`.
    fn read(&self, key: &str, params: &Params) -> Option<Value> {
        let path = self.cache_path(key);
        if !path.is_file() {
            return None;
        }

        let expiration = self.expiration;
        let content = with_file_lock(&path, AccessMode::Read, |mut file| {
            // The sweep may not have run; never serve an entry past its age.
            if is_too_old(&file.metadata()?, SystemTime::now(), expiration) {
                return Ok(None);
            }
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            Ok(Some(content))
        });
        let content = match content {
            Ok(Some(content)) => content,
            Ok(None) => {
                debug!(key, "entry older than expiration");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "cache read failed");
                return None;
            }
        };

        let entry: CacheEntry<Value, Params> = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(source) => {
                let err = StoreError::Deserialize { path, source };
                debug!(error = %err, "ignoring unreadable entry");
                return None;
            }
        };

        if entry.params != *params {
            debug!(key, "stored params differ from request");
            return None;
        }
        Some(entry.data)
    }

    /// Writes `data` for `params` to the entry file for `key`.
    fn write(&self, key: &str, params: &Params, data: &Value) -> bool {
        let entry = CacheEntry { data, params };
        let json = match serde_json::to_string_pretty(&entry) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "cache entry not serializable");
                return false;
            }
        };

        let path = self.cache_path(key);
        match with_file_lock(&path, AccessMode::Overwrite, |mut file| {
            file.write_all(json.as_bytes())?;
            file.flush()
        }) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "cache write failed");
                false
            }
        }
    }
}

impl<P: Producer> CacheStore<P> {
    /// Returns cached data for `params`, producing and caching it on a miss.
    ///
    /// Returns `None` only when the producer fails; the failure message is
    /// kept in [`last_error`](Self::last_error). File system problems never
    /// surface here, they just turn a hit into a miss.
    pub async fn get_data(&mut self, params: &Params) -> Option<Value> {
        self.clean();

        let key = match cache_key(params) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "cannot derive cache key");
                None
            }
        };

        if let Some(key) = key.as_deref() {
            if let Some(data) = self.read(key, params) {
                debug!(key, "cache hit");
                return Some(data);
            }
        }

        let data = match self.producer.produce(params).await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "producer failed");
                self.last_error = Some(e.to_string());
                return None;
            }
        };
        self.last_error = None;

        if let Some(key) = key {
            debug!(key = key.as_str(), "cache miss, storing produced data");
            self.write(&key, params, &data);
        }
        Some(data)
    }
}

/// Whether `name` is a cache entry file name: a hex SHA-256 digest plus `.txt`
fn is_entry_file_name(name: &str) -> bool {
    name.strip_suffix(".txt")
        .is_some_and(|stem| stem.len() == 64 && stem.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Removes entry files in `dir` whose age exceeds `expiration`.
fn sweep_expired(dir: &Path, expiration: Duration) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, dir = %dir.display(), "cannot scan cache directory");
            return 0;
        }
    };

    let now = SystemTime::now();
    entries
        .filter_map(Result::ok)
        .filter(|entry| is_expired(entry, now, expiration))
        .filter(|entry| match fs::remove_file(entry.path()) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, path = %entry.path().display(), "could not remove expired entry");
                false
            }
        })
        .count()
}

fn is_expired(entry: &fs::DirEntry, now: SystemTime, expiration: Duration) -> bool {
    if !entry.file_name().to_str().is_some_and(is_entry_file_name) {
        return false;
    }
    match entry.metadata() {
        Ok(metadata) => metadata.is_file() && is_too_old(&metadata, now, expiration),
        Err(_) => false,
    }
}

fn is_too_old(metadata: &fs::Metadata, now: SystemTime, expiration: Duration) -> bool {
    metadata
        .modified()
        .ok()
        .and_then(|modified| now.duration_since(modified).ok())
        .is_some_and(|age| age > expiration)
}
