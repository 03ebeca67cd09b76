//! The pyramid-aware tile source.
//!
//! [`TileSource`] composes the pyramid geometry, the address mapping, the
//! URL templates and the render options behind the host viewer's tile-grid
//! contract: a URL-resolution function, a tile-grid descriptor, a tile
//! factory, and source-level render-cache invalidation. It contains its
//! collaborators rather than inheriting from a framework base class.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coord::{self, HostTileAddress, ServiceTileAddress};
use crate::geometry::{GeometryError, ImageDescriptor, PyramidGeometry, TierSizeCalculation};
use crate::render::RenderOptions;
use crate::tile::{self, Tile};
use crate::url;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default host tile-cache size, in tiles.
pub const DEFAULT_CACHE_SIZE: u32 = 2048;

/// Default maximum allowed reprojection error, in pixels.
pub const DEFAULT_REPROJECTION_ERROR_THRESHOLD: f64 = 0.5;

fn default_tile_size() -> u32 {
    DEFAULT_TILE_SIZE
}

fn default_cache_size() -> u32 {
    DEFAULT_CACHE_SIZE
}

fn default_reprojection_error_threshold() -> f64 {
    DEFAULT_REPROJECTION_ERROR_THRESHOLD
}

/// Errors raised while constructing a [`TileSource`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Pyramid geometry could not be built from the configuration.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Tile source configuration.
///
/// The data half of the source: everything except the render hooks, which
/// are attached separately through [`RenderOptions`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// URL template, with `{z}`/`{x}`/`{y}`/`{s}` placeholders and an
    /// optional `{a-c}`-style mirror range.
    pub url: String,
    /// Full image size in pixels, `(width, height)`.
    pub size: (u32, u32),
    /// Tile edge length; the same size is used at every level.
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    /// Tier-size-calculation strategy.
    #[serde(default)]
    pub tier_size_calculation: TierSizeCalculation,
    /// Tile-grid extent. Defaults to the fourth quadrant,
    /// `[0, −height, width, 0]`.
    #[serde(default)]
    pub extent: Option<[f64; 4]>,
    /// Attribution text handed through to the host viewer.
    #[serde(default)]
    pub attributions: Option<String>,
    /// Host tile-cache size in tiles.
    #[serde(default = "default_cache_size")]
    pub cache_size: u32,
    /// `crossOrigin` attribute for loaded images.
    #[serde(default)]
    pub cross_origin: Option<String>,
    /// Projection name handed through to the host.
    #[serde(default)]
    pub projection: Option<String>,
    /// Maximum allowed reprojection error in pixels.
    #[serde(default = "default_reprojection_error_threshold")]
    pub reprojection_error_threshold: f64,
    /// Opacity fade-transition duration in milliseconds; `None` leaves the
    /// host default in place.
    #[serde(default)]
    pub transition: Option<f64>,
    /// Cache-partitioning key distinguishing otherwise identical sources.
    #[serde(default)]
    pub cache_key: Option<String>,
}

impl SourceConfig {
    /// Minimal configuration: a template and the image size.
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            size: (width, height),
            tile_size: DEFAULT_TILE_SIZE,
            tier_size_calculation: TierSizeCalculation::Default,
            extent: None,
            attributions: None,
            cache_size: DEFAULT_CACHE_SIZE,
            cross_origin: None,
            projection: None,
            reprojection_error_threshold: DEFAULT_REPROJECTION_ERROR_THRESHOLD,
            transition: None,
            cache_key: None,
        }
    }

    /// Set the tile edge length.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Set the tier-size-calculation strategy.
    pub fn with_tier_size_calculation(mut self, strategy: TierSizeCalculation) -> Self {
        self.tier_size_calculation = strategy;
        self
    }
}

/// Tile-grid descriptor consumed by the host viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    resolutions: Vec<f64>,
    extent: [f64; 4],
    origin: (f64, f64),
    tile_size: u32,
}

impl TileGrid {
    /// Resolutions indexed by host level, descending, finest last.
    pub fn resolutions(&self) -> &[f64] {
        &self.resolutions
    }

    /// Grid extent `[min_x, min_y, max_x, max_y]`.
    pub fn extent(&self) -> [f64; 4] {
        self.extent
    }

    /// Grid origin: the top-left corner of the extent.
    pub fn origin(&self) -> (f64, f64) {
        self.origin
    }

    /// Tile edge length in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }
}

/// Layer source for pyramidal tile services with a private addressing
/// convention and optional raw-pixel tile payloads.
#[derive(Debug, Clone)]
pub struct TileSource {
    geometry: PyramidGeometry,
    grid: TileGrid,
    templates: Vec<String>,
    cache_key: Option<String>,
    options: RenderOptions,
    attributions: Option<String>,
    cache_size: u32,
    cross_origin: Option<String>,
    projection: Option<String>,
    reprojection_error_threshold: f64,
    transition: Option<f64>,
}

impl TileSource {
    /// Build a source from configuration and render options.
    ///
    /// # Errors
    ///
    /// Fails synchronously on invalid geometry configuration; no partially
    /// constructed source is produced.
    pub fn new(config: SourceConfig, options: RenderOptions) -> Result<Self, SourceError> {
        let (width, height) = config.size;
        let descriptor = ImageDescriptor {
            width,
            height,
            tile_size: config.tile_size,
            tier_size_calculation: config.tier_size_calculation,
        };
        let geometry = PyramidGeometry::build(&descriptor)?;

        let extent = config
            .extent
            .unwrap_or([0.0, -f64::from(height), f64::from(width), 0.0]);
        let grid = TileGrid {
            resolutions: geometry.resolutions().iter().map(|&r| r as f64).collect(),
            extent,
            origin: (extent[0], extent[3]),
            tile_size: config.tile_size,
        };

        Ok(Self {
            geometry,
            grid,
            templates: url::expand_url(&config.url),
            cache_key: config.cache_key,
            options,
            attributions: config.attributions,
            cache_size: config.cache_size,
            cross_origin: config.cross_origin,
            projection: config.projection,
            reprojection_error_threshold: config.reprojection_error_threshold,
            transition: config.transition,
        })
    }

    /// The immutable pyramid geometry.
    pub fn geometry(&self) -> &PyramidGeometry {
        &self.geometry
    }

    /// The tile-grid descriptor for the host viewer.
    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// The render options shared by every tile of this source.
    pub fn render_options(&self) -> &RenderOptions {
        &self.options
    }

    /// Whether this source fetches raw binary pixel buffers.
    pub fn use_raw_buffer(&self) -> bool {
        self.options.use_raw_buffer()
    }

    /// Host tile-cache size in tiles.
    pub fn cache_size(&self) -> u32 {
        self.cache_size
    }

    /// Attribution text handed through to the host viewer.
    pub fn attributions(&self) -> Option<&str> {
        self.attributions.as_deref()
    }

    /// Cross-origin policy for loaded images.
    pub fn cross_origin(&self) -> Option<&str> {
        self.cross_origin.as_deref()
    }

    /// Projection name handed through to the host.
    pub fn projection(&self) -> Option<&str> {
        self.projection.as_deref()
    }

    /// Maximum allowed reprojection error in pixels.
    pub fn reprojection_error_threshold(&self) -> f64 {
        self.reprojection_error_threshold
    }

    /// Fade-transition duration in milliseconds, if overridden.
    pub fn transition(&self) -> Option<f64> {
        self.transition
    }

    /// Current cache-partitioning key.
    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    /// Resolve the request URL for a host tile address.
    ///
    /// An absent or out-of-bounds address resolves to `None`, which the
    /// host interprets as "do not fetch this tile". The pixel ratio and
    /// projection are part of the host contract but do not influence the
    /// URL for this service.
    pub fn tile_url(
        &self,
        addr: Option<HostTileAddress>,
        _pixel_ratio: f64,
        _projection: Option<&str>,
    ) -> Option<String> {
        let addr = addr?;
        if !coord::in_bounds(&self.geometry, addr) || self.templates.is_empty() {
            return None;
        }
        let template = &self.templates[url::mirror_index(addr, self.templates.len())];
        url::resolve(template, self.service_address(addr))
    }

    /// Service address for a host address, or `None` outside the pyramid.
    pub fn service_address(&self, addr: HostTileAddress) -> Option<ServiceTileAddress> {
        coord::to_service(self.geometry.num_levels(), self.geometry.tile_size(), addr)
    }

    /// The `(z, x, y)` triple for a host address in the service convention.
    pub fn service_coordinate(&self, addr: HostTileAddress) -> Option<(u32, i32, i32)> {
        self.service_address(addr).map(|s| (s.z, s.x, s.y))
    }

    /// Clipped pixel size of one tile, accounting for the image edge.
    pub fn clipped_tile_size(&self, addr: HostTileAddress) -> Option<(u32, u32)> {
        coord::clipped_tile_size(&self.geometry, addr)
    }

    /// Tile factory for the host cache.
    pub fn create_tile(&self, addr: HostTileAddress) -> Tile {
        Tile::new(addr)
    }

    /// Replace the URL template(s) and optionally the cache-partition key.
    ///
    /// The pyramid geometry is untouched; the host treats differently keyed
    /// cache entries as distinct on its own.
    pub fn set_url(&mut self, url: &str, cache_key: Option<String>) {
        self.templates = url::expand_url(url);
        if cache_key.is_some() {
            self.cache_key = cache_key;
        }
    }

    /// Clear the memoized drawable surface of every tracked tile.
    ///
    /// The host passes in whatever tiles its cache currently holds; decoded
    /// buffers survive, so re-rendering under changed render parameters
    /// needs neither re-fetching nor re-decoding.
    pub fn clear_render_cache<'a>(&self, tiles: impl IntoIterator<Item = &'a mut Tile>) {
        for tile in tiles {
            tile::clear_render_cache(tile);
        }
    }

    /// Nearest pyramid scale for a requested view resolution.
    pub fn scale_for_resolution(&self, resolution: Option<f64>) -> f64 {
        self.geometry.scale_for_resolution(resolution)
    }

    /// Unquantized scale, `1.0 / resolution`.
    pub fn real_scale(&self, resolution: f64) -> f64 {
        self.geometry.real_scale(resolution)
    }
}
