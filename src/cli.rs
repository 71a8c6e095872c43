//! Command-line interface parsing for metacache
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! the cache and fetch configuration used by the binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;

use crate::cache::StoreError;
use crate::config::{CacheConfig, FetchConfig};

/// Error types for the command-line front end
#[derive(Debug, Error)]
pub enum CliError {
    /// The URL argument is not an absolute http(s) URL
    #[error("Invalid URL: '{0}'. Expected an absolute http or https URL")]
    InvalidUrl(String),

    /// No cache directory was given and none could be derived
    #[error("Could not determine a cache directory; pass --cache-dir")]
    NoCacheDir,

    /// The metadata could not be fetched
    #[error("Failed to fetch metadata: {0}")]
    FetchFailed(String),

    /// The key is missing or expired in the key-value store
    #[error("Key not found: '{0}'")]
    KeyNotFound(String),

    /// The key-value store could not be used
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Output could not be encoded
    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

/// metacache - website metadata through a shared on-disk cache
#[derive(Parser, Debug)]
#[command(name = "metacache")]
#[command(about = "Fetch website metadata through a shared on-disk cache")]
#[command(version)]
pub struct Cli {
    /// Directory for cache files (defaults to the user cache directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Lifetime of cache entries in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub expiration: Option<u64>,

    /// Timeout for fetching a page in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Log cache hits, misses and reloads to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the metadata of a web page as JSON
    Fetch {
        /// Page to describe
        url: String,
    },
    /// Remove expired cache entries
    Clean,
    /// Read or write the shared key-value store
    Kv {
        /// Store file (defaults to kv/store.json in the cache directory)
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,

        #[command(subcommand)]
        action: KvAction,
    },
}

/// Key-value store operations
#[derive(Subcommand, Debug)]
pub enum KvAction {
    /// Print the value stored under KEY
    Get { key: String },
    /// Store VALUE under KEY
    ///
    /// VALUE is parsed as JSON when possible and stored as a string otherwise.
    Set {
        key: String,
        value: String,
        /// Lifetime of the entry in seconds (defaults to --expiration)
        #[arg(long, value_name = "SECS")]
        ttl: Option<u64>,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub verbose: bool,
}

impl Settings {
    /// Creates Settings from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(Settings)` with defaults filled in
    /// * `Err(CliError::NoCacheDir)` if no cache directory is available
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut cache = match &cli.cache_dir {
            Some(dir) => CacheConfig::with_dir(dir.clone()),
            None => CacheConfig::from_project_dirs().ok_or(CliError::NoCacheDir)?,
        };
        if let Some(secs) = cli.expiration {
            cache = cache.expiration(Duration::from_secs(secs));
        }

        let mut fetch = FetchConfig::default();
        if let Some(secs) = cli.timeout {
            fetch.timeout = Duration::from_secs(secs);
        }

        Ok(Settings {
            cache,
            fetch,
            verbose: cli.verbose,
        })
    }
}

/// Validates a URL argument.
///
/// # Returns
/// * `Ok(String)` if `s` is an absolute http or https URL
/// * `Err(CliError::InvalidUrl)` otherwise
pub fn parse_url_arg(s: &str) -> Result<String, CliError> {
    match Url::parse(s) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(s.to_string()),
        _ => Err(CliError::InvalidUrl(s.to_string())),
    }
}

/// Interprets a key-value argument as JSON, falling back to a plain string
pub fn parse_kv_value(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string()))
}
