//! Download image bytes over HTTP

use crate::error::{Error, Result};
use tracing::debug;

/// GET `url` and return the body, refusing bodies over `max_bytes`.
/// Connection failures, non-success statuses and oversized bodies are all
/// `Error::Network`.
#[tracing::instrument(skip(client))]
pub async fn fetch_image_bytes(
    client: &reqwest::Client,
    url: &str,
    max_bytes: usize,
) -> Result<Vec<u8>> {
    let mut response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(Error::Network(format!("{url} returned {}", response.status())));
    }

    let too_large = || Error::Network(format!("{url} is larger than {max_bytes} bytes"));
    if response.content_length().is_some_and(|len| len > max_bytes as u64) {
        return Err(too_large());
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(too_large());
        }
        bytes.extend_from_slice(&chunk);
    }

    debug!("fetched {} bytes from {url}", bytes.len());
    Ok(bytes)
}
