//! Tile fetching.
//!
//! Two fetch modes, selected once at source construction: the encoded-image
//! mode decodes a standard compressed image into the tile's loaded image,
//! and the raw-buffer mode attaches the service's binary pixel payload
//! untouched for the render hooks to decode later.
//!
//! Fetches are asynchronous and never block the caller. Completion is
//! applied through [`apply_raw_result`] / [`apply_encoded_result`], which
//! guard against stale deliveries: the host cache may have evicted and
//! recreated a tile while a request was in flight, so a completion whose
//! address no longer matches the tile is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::coord::HostTileAddress;
use crate::tile::{Tile, TileState};

/// Errors reported by tile fetches.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-success HTTP status.
    #[error("HTTP {code} from {url}")]
    Status { code: u16, url: String },

    /// The service returned a success status with no body.
    #[error("Empty tile body")]
    EmptyBody,

    /// The body could not be decoded as an image (encoded mode).
    #[error("Image decode failed: {0}")]
    Decode(String),
}

/// HTTP client operations, abstracted for dependency injection in tests.
pub trait HttpClient: Send + Sync {
    /// Perform an HTTP GET and return the response body.
    fn get(&self, url: &str) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

/// Real HTTP client backed by reqwest.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a client with the default 30 second timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(30)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchError::Http(format!("Failed to read response: {}", e)))
    }
}

/// Fetch a tile as a raw binary pixel buffer.
///
/// A success response with an empty body is an error: the service had
/// nothing for this tile.
pub async fn fetch_raw<C: HttpClient>(client: &C, url: &str) -> Result<Bytes, FetchError> {
    let bytes = client.get(url).await?;
    if bytes.is_empty() {
        return Err(FetchError::EmptyBody);
    }
    debug!(url = %url, len = bytes.len(), "Fetched raw tile buffer");
    Ok(bytes)
}

/// Fetch a tile as an encoded image and decode it to RGBA.
pub async fn fetch_encoded<C: HttpClient>(client: &C, url: &str) -> Result<RgbaImage, FetchError> {
    let bytes = client.get(url).await?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| FetchError::Decode(e.to_string()))?
        .to_rgba8();
    debug!(url = %url, width = image.width(), height = image.height(), "Fetched encoded tile");
    Ok(image)
}

/// Apply a raw-buffer fetch outcome to a tile.
///
/// `address` is the address the fetch was issued for; a mismatch means the
/// tile was evicted and recreated while the request was in flight, and the
/// delivery is dropped.
pub fn apply_raw_result(
    tile: &mut Tile,
    address: HostTileAddress,
    result: Result<Bytes, FetchError>,
) {
    if tile.address != address {
        warn!(?address, current = ?tile.address, "Dropping stale tile fetch completion");
        return;
    }
    match result {
        Ok(bytes) if !bytes.is_empty() => {
            tile.raw = Some(bytes);
            tile.state = TileState::Loaded;
        }
        Ok(_) => {
            warn!(?address, "Raw tile fetch returned an empty body");
            tile.state = TileState::Error;
        }
        Err(error) => {
            warn!(?address, error = %error, "Raw tile fetch failed");
            tile.state = TileState::Error;
        }
    }
}

/// Apply an encoded-image fetch outcome to a tile.
pub fn apply_encoded_result(
    tile: &mut Tile,
    address: HostTileAddress,
    result: Result<RgbaImage, FetchError>,
) {
    if tile.address != address {
        warn!(?address, current = ?tile.address, "Dropping stale tile fetch completion");
        return;
    }
    match result {
        Ok(image) => {
            tile.loaded_image = Some(Arc::new(image));
            tile.state = TileState::Loaded;
        }
        Err(error) => {
            warn!(?address, error = %error, "Encoded tile fetch failed");
            tile.state = TileState::Error;
        }
    }
}

/// Fetch a raw tile and apply the outcome to the tile in one step.
pub async fn load_raw<C: HttpClient>(client: &C, tile: &mut Tile, url: &str) {
    tile.state = TileState::Loading;
    let address = tile.address;
    let result = fetch_raw(client, url).await;
    apply_raw_result(tile, address, result);
}

/// Fetch an encoded tile and apply the outcome to the tile in one step.
pub async fn load_encoded<C: HttpClient>(client: &C, tile: &mut Tile, url: &str) {
    tile.state = TileState::Loading;
    let address = tile.address;
    let result = fetch_encoded(client, url).await;
    apply_encoded_result(tile, address, result);
}
