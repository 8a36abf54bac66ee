//! Shared reqwest plumbing for both remote clients.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

use crate::error::{SyncError, SyncResult};

/// Builds a client with the given per-request timeout.
pub(crate) fn build_client(timeout: Duration) -> SyncResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SyncError::Internal(format!("failed to build HTTP client: {}", e)))
}

/// Parses a base URL and makes sure it ends in `/`, so relative joins keep
/// any path prefix.
pub(crate) fn parse_base_url(raw: &str) -> SyncResult<Url> {
    let mut url = Url::parse(raw).map_err(|e| SyncError::InvalidUrl(format!("{}: {}", raw, e)))?;

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Reads status and body text, mapping a broken connection to `Transport`.
pub(crate) async fn read_response(
    url: &str,
    response: reqwest::Response,
) -> SyncResult<(StatusCode, String)> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| SyncError::transport(url, &e))?;

    Ok((status, body))
}

/// Parses a JSON body. An empty body (e.g. `204 No Content`) is `null`.
pub(crate) fn parse_json(url: &str, body: &str) -> SyncResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(body).map_err(|e| SyncError::decode(url, e))
}
