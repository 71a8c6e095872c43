//! metacache - website metadata through a shared on-disk cache
//!
//! Each invocation is an independent process; concurrent invocations share
//! the cache directory and key-value store file safely through file locks.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use metacache::cache::KeyValueStore;
use metacache::cli::{parse_kv_value, parse_url_arg, Cli, CliError, Command, KvAction, Settings};
use metacache::data::MetadataCache;

/// Sets up logging to stderr; `RUST_LOG` overrides the verbosity flag.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "metacache=debug"
    } else {
        "metacache=warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Executes one subcommand
async fn run(cli: Cli) -> Result<(), CliError> {
    let settings = Settings::from_cli(&cli)?;
    init_tracing(settings.verbose);

    match cli.command {
        Command::Fetch { url } => {
            let url = parse_url_arg(&url)?;
            let mut cache = MetadataCache::new(&settings.cache, settings.fetch);
            let metadata = match cache.get(&url).await {
                Some(metadata) => metadata,
                None => {
                    let reason = cache.last_error().unwrap_or("unknown error");
                    return Err(CliError::FetchFailed(reason.to_string()));
                }
            };
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        Command::Clean => {
            let cache = MetadataCache::new(&settings.cache, settings.fetch);
            let removed = cache.clean();
            println!("Removed {} expired entries", removed);
        }
        Command::Kv { file, action } => {
            let path = file.unwrap_or_else(|| settings.cache.kv_store_path());
            let mut store: KeyValueStore<Value> =
                KeyValueStore::open(path, settings.cache.expiration)?;

            match action {
                KvAction::Get { key } => {
                    let value = store.get(&key).ok_or(CliError::KeyNotFound(key))?;
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                KvAction::Set { key, value, ttl } => {
                    let ttl = ttl.map_or(settings.cache.expiration, Duration::from_secs);
                    store.set_with_ttl(&key, &parse_kv_value(&value), ttl)?;
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("metacache: {}", e);
            ExitCode::FAILURE
        }
    }
}
