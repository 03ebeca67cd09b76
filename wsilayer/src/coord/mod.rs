//! Tile address conversion.
//!
//! The host viewer addresses tiles as `(level, col, row)` with level 0 the
//! coarsest pyramid level and rows growing negative downward from the
//! top-left origin of the fourth-quadrant extent. The remote service
//! addresses the same tiles as `(z, x, y, edge)` with `z = num_levels − 1 −
//! level` and `y = −row − 1`.
//!
//! The conversions are pure functions taking the pyramid level count and
//! tile edge length as explicit parameters; they are bijective over every
//! level's valid tier bounds.

use crate::geometry::PyramidGeometry;

/// Tile address in the host viewer's convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostTileAddress {
    /// Pyramid level; 0 is the coarsest.
    pub level: u32,
    /// Column, growing eastward from 0.
    pub col: i32,
    /// Row, growing negative downward; the top row is −1.
    pub row: i32,
}

impl HostTileAddress {
    /// Create a host tile address.
    pub fn new(level: u32, col: i32, row: i32) -> Self {
        Self { level, col, row }
    }
}

/// Tile address in the remote service's convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceTileAddress {
    /// Service zoom; 0 is the finest pyramid level.
    pub z: u32,
    /// Column, equal to the host column.
    pub x: i32,
    /// Row, growing positive downward from 0.
    pub y: i32,
    /// Tile edge length in pixels.
    pub edge: u32,
}

/// Convert a host address to the service convention.
///
/// Returns `None` when the level is outside the pyramid.
#[inline]
pub fn to_service(
    num_levels: u32,
    tile_size: u32,
    addr: HostTileAddress,
) -> Option<ServiceTileAddress> {
    if addr.level >= num_levels {
        return None;
    }
    Some(ServiceTileAddress {
        z: num_levels - 1 - addr.level,
        x: addr.col,
        y: -addr.row - 1,
        edge: tile_size,
    })
}

/// Convert a service address back to the host convention.
///
/// Returns `None` when the zoom is outside the pyramid or the edge length
/// does not match the pyramid's tile size.
#[inline]
pub fn to_host(
    num_levels: u32,
    tile_size: u32,
    addr: ServiceTileAddress,
) -> Option<HostTileAddress> {
    if addr.z >= num_levels || addr.edge != tile_size {
        return None;
    }
    Some(HostTileAddress {
        level: num_levels - 1 - addr.z,
        col: addr.x,
        row: -addr.y - 1,
    })
}

/// Whether a host address lies within its level's tier bounds.
pub fn in_bounds(geometry: &PyramidGeometry, addr: HostTileAddress) -> bool {
    let Some(level) = geometry.level(addr.level) else {
        return false;
    };
    let (cols, rows) = level.tier_size;
    let y = -addr.row - 1;
    addr.col >= 0 && (addr.col as u32) < cols && y >= 0 && (y as u32) < rows
}

/// Pixel width and height of one specific tile.
///
/// Tiles in the last column or row of a level are clipped to the image edge
/// and may be smaller than the tile edge length. Returns `None` for
/// addresses outside the level's tier bounds.
pub fn clipped_tile_size(geometry: &PyramidGeometry, addr: HostTileAddress) -> Option<(u32, u32)> {
    if !in_bounds(geometry, addr) {
        return None;
    }
    let level = geometry.level(addr.level)?;
    let tile_size = geometry.tile_size();
    let (level_width, level_height) = level.pixel_size;

    let x_offset = addr.col as u32 * tile_size;
    let y_offset = (-addr.row - 1) as u32 * tile_size;

    let width = tile_size.min(level_width - x_offset.min(level_width));
    let height = tile_size.min(level_height - y_offset.min(level_height));
    Some((width, height))
}
