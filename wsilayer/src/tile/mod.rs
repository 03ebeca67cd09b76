//! Tiles and the decode/render pipeline.
//!
//! A [`Tile`] is one addressable grid cell: a lifecycle state plus three
//! independent payload slots (raw bytes, decoded buffer, drawable surface).
//! Tiles are plain values manipulated by free functions; the host tile cache
//! owns their lifetime and eviction policy.
//!
//! [`drawable_surface`] is the single pipeline entry point. It is idempotent
//! and memoizing: a cached surface is returned as-is, hook failures produce
//! an uncached best-effort fallback, and [`clear_render_cache`] invalidates
//! only the surface slot so changed render parameters re-render without
//! re-fetching or re-decoding.

use std::sync::Arc;

use bytes::Bytes;
use image::RgbaImage;
use tracing::warn;

use crate::coord::HostTileAddress;
use crate::render::{DecodedBuffer, RenderOptions};

/// Tile lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Created, nothing requested yet.
    Idle,
    /// A fetch is in flight.
    Loading,
    /// Payload attached; decode/render may still be pending.
    Loaded,
    /// Terminal fetch failure. Retry policy belongs to the host cache.
    Error,
}

/// One addressable grid cell.
#[derive(Debug, Clone)]
pub struct Tile {
    /// The host address this tile was created for. Completion callbacks are
    /// checked against it to drop stale deliveries.
    pub address: HostTileAddress,
    /// Lifecycle state.
    pub state: TileState,
    /// Raw service payload (raw-buffer mode). Dropped once decoded.
    pub raw: Option<Bytes>,
    /// Decoded pixel buffer, cached independently of the surface.
    pub decoded: Option<DecodedBuffer>,
    /// Decoded encoded-mode image (the standard image-loading path).
    pub loaded_image: Option<Arc<RgbaImage>>,
    /// Memoized drawable surface.
    pub surface: Option<Arc<RgbaImage>>,
}

impl Tile {
    /// Create an idle tile for an address.
    pub fn new(address: HostTileAddress) -> Self {
        Self {
            address,
            state: TileState::Idle,
            raw: None,
            decoded: None,
            loaded_image: None,
            surface: None,
        }
    }
}

/// Outcome of a drawable-surface request.
#[derive(Debug, Clone)]
pub enum DrawResult {
    /// The memoized surface; repeated calls return it without recomputation.
    Ready(Arc<RgbaImage>),
    /// Not loaded yet (or nothing renderable): the host shows its in-flight
    /// placeholder unchanged.
    Pending,
    /// Best-effort surface after a hook failure. Never cached; the next
    /// access retries decode/render from scratch.
    Fallback(Arc<RgbaImage>),
}

/// Produce the drawable surface for a tile.
///
/// Idempotent: a memoized surface short-circuits everything else. Otherwise
/// the decoded buffer is ensured (from raw bytes, or from the loaded image's
/// pixels) and rendered into a freshly allocated surface, which is memoized
/// on success.
///
/// Hook failures are non-terminal by design: the tile stays `Loaded`, no
/// result is cached, and the best available fallback is returned so a later
/// access retries. A persistently malformed payload therefore retries on
/// every access, each retry driven by a new request rather than an internal
/// loop.
pub fn drawable_surface(tile: &mut Tile, options: &RenderOptions) -> DrawResult {
    if let Some(surface) = &tile.surface {
        return DrawResult::Ready(surface.clone());
    }
    if tile.state != TileState::Loaded {
        return DrawResult::Pending;
    }

    if tile.decoded.is_none() {
        let processed = if let Some(raw) = &tile.raw {
            Some(options.processor().process(raw, None))
        } else if let Some(image) = &tile.loaded_image {
            // Encoded path: the image's pixel readback stands in for the
            // raw payload.
            let size = (image.width(), image.height());
            Some(options.processor().process(image.as_raw(), Some(size)))
        } else {
            None
        };

        match processed {
            None => return DrawResult::Pending,
            Some(Ok(buffer)) => {
                tile.decoded = Some(buffer);
                // The raw payload is fully represented by the decoded
                // buffer from here on.
                tile.raw = None;
            }
            Some(Err(error)) => {
                warn!(
                    error = %error,
                    level = tile.address.level,
                    col = tile.address.col,
                    row = tile.address.row,
                    "Buffer processing failed; serving fallback"
                );
                return match &tile.loaded_image {
                    Some(image) => DrawResult::Fallback(image.clone()),
                    None => DrawResult::Pending,
                };
            }
        }
    }

    let Some(decoded) = &tile.decoded else {
        return DrawResult::Pending;
    };
    let size = (decoded.width, decoded.height);
    let mut surface = RgbaImage::new(size.0, size.1);
    match options.renderer().render(&mut surface, decoded, size) {
        Ok(()) => {
            let surface = Arc::new(surface);
            tile.surface = Some(surface.clone());
            DrawResult::Ready(surface)
        }
        Err(error) => {
            warn!(
                error = %error,
                level = tile.address.level,
                col = tile.address.col,
                row = tile.address.row,
                "Buffer rendering failed; serving partial surface"
            );
            DrawResult::Fallback(Arc::new(surface))
        }
    }
}

/// Invalidate a tile's memoized surface.
///
/// The decoded buffer and any raw payload survive, so the next
/// [`drawable_surface`] call re-renders without re-fetching or re-decoding.
/// This is the cheap path for re-rendering under changed
/// [`crate::render::RenderParams`].
pub fn clear_render_cache(tile: &mut Tile) {
    tile.surface = None;
}
