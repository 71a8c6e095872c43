//! Data producers
//!
//! Fetching remote documents and turning them into cacheable metadata.

pub mod metadata;
pub mod remote;

pub use metadata::{extract_metadata, MetadataCache, MetadataClient};
pub use remote::{fetch_remote_contents, RemoteError};
