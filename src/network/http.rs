//! HTTP client for network handles
//!
//! A blocking GET against a producer's loopback endpoint. The response size
//! is bounded: a declared `Content-Length` over the limit is refused before
//! any body is read, and bodies without one are read through a capped reader.

use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONNECTION;
use reqwest::StatusCode;

use crate::error::{CacheError, Result};

/// Largest body `fetch` accepts unless told otherwise (256 MB)
pub const DEFAULT_MAX_RESPONSE_SIZE: u64 = 256 * 1024 * 1024;

/// Fetch `url` with a blocking GET
///
/// `Ok(Some(body))` on 200, `Ok(None)` on 404, an error for any other status
/// or for a body larger than `max_size`.
pub fn fetch(url: &str, timeout: Duration, max_size: u64) -> Result<Option<Vec<u8>>> {
    let client = Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        // Loopback traffic must never be routed through a proxy.
        .no_proxy()
        .build()
        .map_err(|e| CacheError::Network(format!("cannot build HTTP client: {}", e)))?;

    let mut response = client
        .get(url)
        .header(CONNECTION, "close")
        .send()
        .map_err(|e| CacheError::Network(format!("GET {}: {}", url, e)))?;

    match response.status() {
        StatusCode::OK => {}
        StatusCode::NOT_FOUND => return Ok(None),
        status => {
            return Err(CacheError::Network(format!(
                "unexpected status {} from {}",
                status, url
            )))
        }
    }

    if let Some(length) = response.content_length() {
        if length > max_size {
            return Err(too_large(url, length, max_size));
        }
    }

    let mut body = Vec::new();
    response
        .by_ref()
        .take(max_size.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|e| CacheError::Network(format!("reading body of {}: {}", url, e)))?;
    if body.len() as u64 > max_size {
        return Err(too_large(url, body.len() as u64, max_size));
    }

    tracing::trace!("Fetched {} bytes from {}", body.len(), url);
    Ok(Some(body))
}

fn too_large(url: &str, size: u64, limit: u64) -> CacheError {
    CacheError::Network(format!(
        "response from {} is {} bytes, over the {} byte limit",
        url, size, limit
    ))
}
