//! WSILayer - Pyramidal tile sources for whole-slide imagery viewers
//!
//! This library provides the tile-source subsystem a map-style viewer needs
//! to display extremely large multi-resolution raster images (whole-slide
//! microscopy scans) served by a remote tile service with its own
//! coordinate convention, URL scheme, and optionally a raw-pixel tile
//! encoding:
//!
//! - [`geometry`] derives the resolution pyramid from the raw image size,
//!   tile edge length and tier-size-calculation strategy, and resolves view
//!   resolutions to pyramid scales.
//! - [`coord`] converts between the host viewer's tile addressing and the
//!   service's convention, and clips edge tiles to the image bounds.
//! - [`url`] expands mirror templates and substitutes tile addresses into
//!   request URLs.
//! - [`fetch`] retrieves tile payloads, either as encoded images or raw
//!   binary pixel buffers, and reports terminal load states.
//! - [`render`] holds the caller-supplied decode/render hooks and their
//!   opaque parameters.
//! - [`tile`] is the per-tile state and the memoizing decode/render
//!   pipeline with selective invalidation.
//! - [`source`] composes all of the above behind the host viewer's
//!   tile-grid contract.

pub mod coord;
pub mod fetch;
pub mod geometry;
pub mod render;
pub mod source;
pub mod tile;
pub mod url;

pub use coord::{HostTileAddress, ServiceTileAddress};
pub use fetch::{FetchError, HttpClient, ReqwestClient};
pub use geometry::{
    GeometryError, ImageDescriptor, PyramidGeometry, PyramidLevel, TierSizeCalculation,
};
pub use render::{
    BufferProcessor, BufferRenderer, DecodedBuffer, RenderError, RenderOptions, RenderParams,
};
pub use source::{SourceConfig, SourceError, TileGrid, TileSource};
pub use tile::{DrawResult, Tile, TileState};
