//! Remote document fetching
//!
//! A thin wrapper over `reqwest` that only accepts `200 OK` responses.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when fetching a remote document
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed (connection, timeout, body decoding)
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The server answered with something other than 200 OK
    #[error("Unexpected HTTP status: {0}")]
    StatusError(StatusCode),
}

/// Fetches the body of `url` as text.
///
/// # Arguments
/// * `client` - HTTP client to issue the request with
/// * `url` - Address of the document
/// * `timeout` - Maximum time for the whole request
///
/// # Returns
/// * `Ok(String)` - The response body
/// * `Err(RemoteError)` - On transport failure, timeout, or a non-200 status
pub async fn fetch_remote_contents(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<String, RemoteError> {
    debug!(url, "fetching remote document");
    let response = client.get(url).timeout(timeout).send().await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(RemoteError::StatusError(status));
    }
    Ok(response.text().await?)
}
