//! Persistent key-value map with per-entry expiry
//!
//! The whole map lives in one JSON file shared between processes. Each
//! instance keeps an in-memory mirror of the file and reloads it whenever the
//! file's modification time has moved past the one seen at the last load.
//! Every access holds the file's exclusive lock, so all keys share a single
//! lock domain.
//!
//! The mirror's staleness check is only as precise as the file system's
//! mtime. Two writes landing inside the same mtime tick are indistinguishable
//! and the second one can be missed by another instance until the next write.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{StoreError, StoreResult};
use super::lock::FileLock;

/// One slot of the map as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct KvEntry {
    /// The value, JSON-encoded
    value: String,
    /// Unix timestamp (seconds) after which the entry is dead
    exp_time: f64,
}

/// In-memory copy of the map and the mtime it was loaded at
#[derive(Debug)]
struct Mirror {
    entries: BTreeMap<String, KvEntry>,
    loaded_at: SystemTime,
}

impl Mirror {
    /// Reloads from `file` if its mtime is newer than the last load.
    fn refresh(&mut self, mut file: &File) -> io::Result<()> {
        let modified = file.metadata()?.modified()?;
        if modified <= self.loaded_at {
            return Ok(());
        }

        file.seek(SeekFrom::Start(0))?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;

        self.entries = if content.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(error = %e, "discarding malformed key-value file");
                BTreeMap::new()
            })
        };
        self.loaded_at = modified;
        debug!(entries = self.entries.len(), "reloaded key-value mirror");
        Ok(())
    }

    /// Returns the raw value for `key` if it has not expired at `now`
    fn live_value(&self, key: &str, now: f64) -> Option<&str> {
        self.entries
            .get(key)
            .filter(|entry| entry.exp_time > now)
            .map(|entry| entry.value.as_str())
    }
}

/// Current time as fractional Unix seconds, millisecond precision
fn now_timestamp() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// A map of `String` keys to `V` values persisted in a single file
#[derive(Debug)]
pub struct KeyValueStore<V> {
    /// Backing file path
    path: PathBuf,
    /// Lifetime used by [`set`](Self::set)
    default_ttl: Duration,
    /// Handle owned for the lifetime of the store
    file: File,
    mirror: Mirror,
    _value: PhantomData<fn() -> V>,
}

impl<V: Serialize + DeserializeOwned> KeyValueStore<V> {
    /// Opens (or creates) the store at `path`.
    ///
    /// Missing parent directories are created. Failing to create them or to
    /// open the file is fatal since the store cannot work without its file.
    pub fn open(path: impl Into<PathBuf>, default_ttl: Duration) -> StoreResult<Self> {
        let path = path.into();

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            if !dir.is_dir() {
                fs::create_dir_all(dir).map_err(|source| StoreError::DirectoryCreate {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| StoreError::ResourceOpen {
                path: path.clone(),
                source,
            })?;

        let mut store = Self {
            path,
            default_ttl,
            file,
            mirror: Mirror {
                entries: BTreeMap::new(),
                loaded_at: SystemTime::UNIX_EPOCH,
            },
            _value: PhantomData,
        };

        {
            let lock = FileLock::acquire(&store.file, &store.path)?;
            store.mirror.refresh(lock.file())?;
        }
        Ok(store)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the value for `key`, or `None` if it is missing, expired, or
    /// the file could not be read.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let raw = {
            let lock = match FileLock::acquire(&self.file, &self.path) {
                Ok(lock) => lock,
                Err(e) => {
                    warn!(error = %e, "key-value get failed");
                    return None;
                }
            };
            if let Err(e) = self.mirror.refresh(lock.file()) {
                warn!(error = %e, path = %self.path.display(), "key-value reload failed");
                return None;
            }
            self.mirror.live_value(key, now_timestamp())?.to_string()
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, key, "stored value does not decode");
                None
            }
        }
    }

    /// Stores `value` under `key` using the store's default lifetime
    pub fn set(&mut self, key: &str, value: &V) -> StoreResult<()> {
        self.set_with_ttl(key, value, self.default_ttl)
    }

    /// Stores `value` under `key`, visible for `ttl` from now.
    ///
    /// The whole map is rewritten, so the cost grows with the number of
    /// entries. On error the file is left for the next writer to replace.
    pub fn set_with_ttl(&mut self, key: &str, value: &V, ttl: Duration) -> StoreResult<()> {
        self.write_entry(key, value, ttl).inspect_err(|e| {
            warn!(error = %e, key, path = %self.path.display(), "key-value set failed");
        })
    }

    /// Upserts one entry and rewrites the whole file under the lock
    fn write_entry(&mut self, key: &str, value: &V, ttl: Duration) -> StoreResult<()> {
        let encoded = serde_json::to_string(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let lock = FileLock::acquire(&self.file, &self.path)?;
        self.mirror.refresh(lock.file())?;
        self.mirror.entries.insert(
            key.to_string(),
            KvEntry {
                value: encoded,
                exp_time: now_timestamp() + ttl.as_secs_f64(),
            },
        );

        let json = serde_json::to_string(&self.mirror.entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = lock.file();
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        file.write_all(json.as_bytes())?;
        file.flush()?;

        self.mirror.loaded_at = file.metadata()?.modified()?;
        Ok(())
    }
}
