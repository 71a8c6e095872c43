//! Runtime configuration for the cache and the metadata fetcher
//!
//! All settings are plain values handed to components at construction time.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

/// Default lifetime of a cache entry file
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Default timeout for fetching a remote document
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Sub-directory of the cache directory holding the key-value store.
///
/// The entry sweep never descends into sub-directories.
pub const KV_STORE_DIR: &str = "kv";

/// File name of the key-value store
pub const KV_STORE_FILE: &str = "store.json";

/// Where cache entries live and how long they stay valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory holding one file per cache entry
    pub cache_dir: PathBuf,
    /// Entries whose modification time is older than this are swept
    pub expiration: Duration,
}

impl CacheConfig {
    /// Creates a config using the XDG-compliant cache directory
    ///
    /// Uses `~/.cache/metacache/` on Linux, or the equivalent path on other
    /// platforms. Returns `None` if no home directory can be determined.
    pub fn from_project_dirs() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "metacache")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a config for a specific directory with the default expiration
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            expiration: DEFAULT_EXPIRATION,
        }
    }

    /// Replaces the expiration
    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    /// Default location of the key-value store file
    pub fn kv_store_path(&self) -> PathBuf {
        self.cache_dir.join(KV_STORE_DIR).join(KV_STORE_FILE)
    }
}

/// Settings for the remote document fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Maximum time to wait for the whole request
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}
