//! Resolution pyramid geometry.
//!
//! Derives the list of pyramid levels (tier sizes, resolution factors, scale
//! factors, per-level pixel dimensions) from the raw image dimensions, the
//! tile edge length, and a tier-size-calculation strategy.
//!
//! # Level numbering
//!
//! Levels are numbered with 0 = coarsest (the single-tile root) and
//! `num_levels() - 1` = finest (full resolution). The public arrays follow
//! the same indexing: [`PyramidGeometry::resolutions`] is descending and ends
//! at 1, [`PyramidGeometry::scales`] is ascending and ends at 1.0.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Strategy for computing the number of tiles per pyramid tier.
///
/// The two strategies produce different level counts and tier boundaries for
/// some image sizes (e.g. 513×513), so the deployment must pick the one its
/// tile service uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierSizeCalculation {
    /// Double the tile comparison size each iteration.
    Default,
    /// Keep the comparison size fixed and halve (integer right-shift) the
    /// working image dimensions each iteration.
    Truncated,
}

impl Default for TierSizeCalculation {
    fn default() -> Self {
        TierSizeCalculation::Default
    }
}

impl fmt::Display for TierSizeCalculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierSizeCalculation::Default => write!(f, "default"),
            TierSizeCalculation::Truncated => write!(f, "truncated"),
        }
    }
}

impl FromStr for TierSizeCalculation {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(TierSizeCalculation::Default),
            "truncated" => Ok(TierSizeCalculation::Truncated),
            other => Err(GeometryError::UnknownTierSizeCalculation(
                other.to_string(),
            )),
        }
    }
}

/// Errors raised while building pyramid geometry.
///
/// All of these are configuration errors reported synchronously at
/// construction; no partial geometry is ever produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeometryError {
    /// The configured tier-size-calculation strategy is not recognized.
    #[error("Unknown tier size calculation: {0}")]
    UnknownTierSizeCalculation(String),

    /// Image width or height is zero.
    #[error("Image dimensions must be non-zero, got {width}×{height}")]
    EmptyImage { width: u32, height: u32 },

    /// Tile edge length is zero.
    #[error("Tile size must be non-zero")]
    ZeroTileSize,
}

/// Immutable description of the full-resolution image and its tiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Full image width in pixels.
    pub width: u32,
    /// Full image height in pixels.
    pub height: u32,
    /// Edge length in pixels of every (square) tile, at every level.
    pub tile_size: u32,
    /// Tier-size-calculation strategy.
    #[serde(default)]
    pub tier_size_calculation: TierSizeCalculation,
}

impl ImageDescriptor {
    /// Create a descriptor with the given dimensions and tile edge length,
    /// using the [`TierSizeCalculation::Default`] strategy.
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        Self {
            width,
            height,
            tile_size,
            tier_size_calculation: TierSizeCalculation::Default,
        }
    }

    /// Set the tier-size-calculation strategy.
    pub fn with_tier_size_calculation(mut self, strategy: TierSizeCalculation) -> Self {
        self.tier_size_calculation = strategy;
        self
    }
}

/// One resolution step of the pyramid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyramidLevel {
    /// Level index; 0 is the coarsest (single-tile) level.
    pub level: u32,
    /// Integer resolution factor relative to the finest level. Powers of
    /// two: 1 at the finest level, doubling toward coarser levels.
    pub resolution: u64,
    /// Real scale factor in (0, 1]; 1.0 at the finest level, halving toward
    /// coarser levels. Always `1.0 / resolution`.
    pub scale: f64,
    /// Tier size in tiles, `(columns, rows)`.
    pub tier_size: (u32, u32),
    /// Full-image pixel dimensions at this level, `floor(dim × scale)`.
    pub pixel_size: (u32, u32),
}

/// The derived resolution pyramid.
///
/// Built once from an [`ImageDescriptor`]; immutable afterwards, so it can be
/// shared by reference across every tile of a source.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidGeometry {
    levels: Vec<PyramidLevel>,
    tile_size: u32,
    image_size: (u32, u32),
    tile_count_up_to_tier: Vec<u64>,
}

impl PyramidGeometry {
    /// Build the pyramid for the given image.
    ///
    /// Deterministic and pure; performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] for zero-sized images or a zero tile edge.
    /// No partial geometry is produced on error.
    pub fn build(descriptor: &ImageDescriptor) -> Result<Self, GeometryError> {
        let ImageDescriptor {
            width,
            height,
            tile_size,
            tier_size_calculation,
        } = *descriptor;

        if width == 0 || height == 0 {
            return Err(GeometryError::EmptyImage { width, height });
        }
        if tile_size == 0 {
            return Err(GeometryError::ZeroTileSize);
        }

        // Record one tier per iteration while either dimension exceeds the
        // comparison size; the strategies differ only in how they advance.
        let mut tiers: Vec<(u32, u32)> = Vec::new();
        match tier_size_calculation {
            TierSizeCalculation::Default => {
                let mut compare = u64::from(tile_size);
                while u64::from(width) > compare || u64::from(height) > compare {
                    tiers.push((
                        div_ceil_u64(width, compare),
                        div_ceil_u64(height, compare),
                    ));
                    compare += compare;
                }
            }
            TierSizeCalculation::Truncated => {
                let compare = tile_size;
                let mut w = width;
                let mut h = height;
                while w > compare || h > compare {
                    tiers.push((w.div_ceil(compare), h.div_ceil(compare)));
                    w >>= 1;
                    h >>= 1;
                }
            }
        }

        // The coarsest level is always a single tile.
        tiers.push((1, 1));
        tiers.reverse();

        let num_levels = tiers.len() as u32;
        let mut tile_count_up_to_tier = vec![0u64];
        for i in 1..tiers.len() {
            let (cols, rows) = tiers[i - 1];
            tile_count_up_to_tier
                .push(u64::from(cols) * u64::from(rows) + tile_count_up_to_tier[i - 1]);
        }

        let levels = tiers
            .into_iter()
            .enumerate()
            .map(|(i, tier_size)| {
                let shift = num_levels - 1 - i as u32;
                let resolution = 1u64 << shift;
                let scale = 1.0 / resolution as f64;
                let pixel_size = (
                    (f64::from(width) * scale).floor() as u32,
                    (f64::from(height) * scale).floor() as u32,
                );
                PyramidLevel {
                    level: i as u32,
                    resolution,
                    scale,
                    tier_size,
                    pixel_size,
                }
            })
            .collect();

        Ok(Self {
            levels,
            tile_size,
            image_size: (width, height),
            tile_count_up_to_tier,
        })
    }

    /// Number of pyramid levels.
    pub fn num_levels(&self) -> u32 {
        self.levels.len() as u32
    }

    /// All levels, coarsest first.
    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    /// Level by index, or `None` when out of range.
    pub fn level(&self, level: u32) -> Option<&PyramidLevel> {
        self.levels.get(level as usize)
    }

    /// Tile edge length in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Full-resolution image dimensions in pixels.
    pub fn image_size(&self) -> (u32, u32) {
        self.image_size
    }

    /// Resolution factors indexed by level: descending, ending at 1 for the
    /// finest level.
    pub fn resolutions(&self) -> Vec<u64> {
        self.levels.iter().map(|l| l.resolution).collect()
    }

    /// Scale factors indexed by level: ascending, ending at 1.0 for the
    /// finest level.
    pub fn scales(&self) -> Vec<f64> {
        self.levels.iter().map(|l| l.scale).collect()
    }

    /// Number of tiles in all levels coarser than `level`.
    ///
    /// Used by services that address tiles through a single linear index.
    pub fn tile_count_up_to_tier(&self, level: u32) -> Option<u64> {
        self.tile_count_up_to_tier.get(level as usize).copied()
    }

    /// Scale factor of the level whose resolution factor is nearest to the
    /// requested resolution.
    ///
    /// Ties are broken by the lowest level index. `None` resolves to `1.0`.
    pub fn scale_for_resolution(&self, resolution: Option<f64>) -> f64 {
        let Some(res) = resolution else {
            return 1.0;
        };
        let mut best = 0usize;
        let mut best_distance = (self.levels[0].resolution as f64 - res).abs();
        for (i, level) in self.levels.iter().enumerate().skip(1) {
            let distance = (level.resolution as f64 - res).abs();
            if distance < best_distance {
                best = i;
                best_distance = distance;
            }
        }
        self.levels[best].scale
    }

    /// Unquantized scale for a resolution, `1.0 / resolution`, with no
    /// pyramid lookup.
    pub fn real_scale(&self, resolution: f64) -> f64 {
        1.0 / resolution
    }
}

#[inline]
fn div_ceil_u64(dim: u32, compare: u64) -> u32 {
    // compare starts at the (non-zero) tile size, so this never divides by
    // zero; the quotient never exceeds dim, so the cast back is lossless.
    (u64::from(dim).div_ceil(compare)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(width: u32, height: u32, tile_size: u32) -> PyramidGeometry {
        PyramidGeometry::build(&ImageDescriptor::new(width, height, tile_size)).unwrap()
    }

    #[test]
    fn test_default_strategy_1000x800() {
        // Comparison sizes 256 and 512 each record a tier; at 1024 neither
        // dimension exceeds the comparison size, so the loop stops and the
        // single-tile root is appended.
        let geometry = build(1000, 800, 256);

        assert_eq!(geometry.num_levels(), 3);
        assert_eq!(
            geometry
                .levels()
                .iter()
                .map(|l| l.tier_size)
                .collect::<Vec<_>>(),
            vec![(1, 1), (2, 2), (4, 4)]
        );
        assert_eq!(geometry.resolutions(), vec![4, 2, 1]);
        assert_eq!(geometry.scales(), vec![0.25, 0.5, 1.0]);
    }

    #[test]
    fn test_level_pixel_dimensions() {
        let geometry = build(1000, 800, 256);

        let dims: Vec<_> = geometry.levels().iter().map(|l| l.pixel_size).collect();
        assert_eq!(dims, vec![(250, 200), (500, 400), (1000, 800)]);
    }

    #[test]
    fn test_image_fits_single_tile() {
        let geometry = build(256, 256, 256);

        assert_eq!(geometry.num_levels(), 1);
        assert_eq!(geometry.levels()[0].tier_size, (1, 1));
        assert_eq!(geometry.resolutions(), vec![1]);
        assert_eq!(geometry.scales(), vec![1.0]);
    }

    #[test]
    fn test_truncated_strategy_differs_from_default() {
        // 513×513: the default strategy records tiers at comparison sizes
        // 256 and 512, while the truncated strategy halves 513 to 256 after
        // its first tier and stops.
        let default = build(513, 513, 256);
        let truncated = PyramidGeometry::build(
            &ImageDescriptor::new(513, 513, 256)
                .with_tier_size_calculation(TierSizeCalculation::Truncated),
        )
        .unwrap();

        assert_eq!(default.num_levels(), 3);
        assert_eq!(truncated.num_levels(), 2);
        assert_eq!(truncated.levels()[1].tier_size, (3, 3));
    }

    #[test]
    fn test_truncated_strategy_tier_sizes() {
        let geometry = PyramidGeometry::build(
            &ImageDescriptor::new(1000, 800, 256)
                .with_tier_size_calculation(TierSizeCalculation::Truncated),
        )
        .unwrap();

        // 1000×800 → (4,4); halved to 500×400 → (2,2); halved to 250×200
        // fits, so the root closes the pyramid.
        assert_eq!(
            geometry
                .levels()
                .iter()
                .map(|l| l.tier_size)
                .collect::<Vec<_>>(),
            vec![(1, 1), (2, 2), (4, 4)]
        );
    }

    #[test]
    fn test_tile_count_up_to_tier() {
        let geometry = build(1000, 800, 256);

        assert_eq!(geometry.tile_count_up_to_tier(0), Some(0));
        assert_eq!(geometry.tile_count_up_to_tier(1), Some(1));
        assert_eq!(geometry.tile_count_up_to_tier(2), Some(5));
        assert_eq!(geometry.tile_count_up_to_tier(3), None);
    }

    #[test]
    fn test_empty_image_rejected() {
        let result = PyramidGeometry::build(&ImageDescriptor::new(0, 800, 256));
        assert_eq!(
            result.unwrap_err(),
            GeometryError::EmptyImage {
                width: 0,
                height: 800
            }
        );
    }

    #[test]
    fn test_zero_tile_size_rejected() {
        let result = PyramidGeometry::build(&ImageDescriptor::new(1000, 800, 0));
        assert_eq!(result.unwrap_err(), GeometryError::ZeroTileSize);
    }

    #[test]
    fn test_unknown_strategy_string_rejected() {
        let result = "bilinear".parse::<TierSizeCalculation>();
        assert_eq!(
            result.unwrap_err(),
            GeometryError::UnknownTierSizeCalculation("bilinear".to_string())
        );
    }

    #[test]
    fn test_strategy_round_trips_through_strings() {
        for strategy in [TierSizeCalculation::Default, TierSizeCalculation::Truncated] {
            let parsed: TierSizeCalculation = strategy.to_string().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
    }

    #[test]
    fn test_scale_for_resolution_exact_match() {
        let geometry = build(1000, 800, 256);

        assert_eq!(geometry.scale_for_resolution(Some(4.0)), 0.25);
        assert_eq!(geometry.scale_for_resolution(Some(2.0)), 0.5);
        assert_eq!(geometry.scale_for_resolution(Some(1.0)), 1.0);
    }

    #[test]
    fn test_scale_for_resolution_absent_is_unity() {
        let geometry = build(1000, 800, 256);
        assert_eq!(geometry.scale_for_resolution(None), 1.0);
    }

    #[test]
    fn test_scale_for_resolution_tie_prefers_lowest_level() {
        let geometry = build(1000, 800, 256);

        // Resolution 3 is equidistant from 4 (level 0) and 2 (level 1).
        assert_eq!(geometry.scale_for_resolution(Some(3.0)), 0.25);
    }

    #[test]
    fn test_real_scale() {
        let geometry = build(1000, 800, 256);
        assert_eq!(geometry.real_scale(4.0), 0.25);
        assert_eq!(geometry.real_scale(1.0), 1.0);
    }

    #[test]
    fn test_large_image_level_count() {
        // 46920×33600 with 256px tiles: tiers at 256..=32768, plus the root.
        let geometry = build(46920, 33600, 256);
        assert_eq!(geometry.num_levels(), 9);
        assert_eq!(geometry.levels()[8].tier_size, (184, 132));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_resolutions_double_and_end_at_one(
                width in 1u32..100_000,
                height in 1u32..100_000,
                tile_size in 1u32..2048,
                truncated in proptest::bool::ANY
            ) {
                let strategy = if truncated {
                    TierSizeCalculation::Truncated
                } else {
                    TierSizeCalculation::Default
                };
                let geometry = PyramidGeometry::build(
                    &ImageDescriptor::new(width, height, tile_size)
                        .with_tier_size_calculation(strategy),
                )
                .unwrap();

                let resolutions = geometry.resolutions();
                prop_assert_eq!(*resolutions.last().unwrap(), 1);
                for pair in resolutions.windows(2) {
                    prop_assert_eq!(pair[0], pair[1] * 2);
                }
            }

            #[test]
            fn test_scales_halve_and_end_at_unity(
                width in 1u32..100_000,
                height in 1u32..100_000,
                tile_size in 1u32..2048
            ) {
                let geometry = PyramidGeometry::build(
                    &ImageDescriptor::new(width, height, tile_size),
                )
                .unwrap();

                let scales = geometry.scales();
                prop_assert_eq!(*scales.last().unwrap(), 1.0);
                for pair in scales.windows(2) {
                    prop_assert_eq!(pair[0], pair[1] / 2.0);
                }
            }

            #[test]
            fn test_scale_matches_inverse_resolution(
                width in 1u32..100_000,
                height in 1u32..100_000,
                tile_size in 1u32..2048
            ) {
                let geometry = PyramidGeometry::build(
                    &ImageDescriptor::new(width, height, tile_size),
                )
                .unwrap();

                for level in geometry.levels() {
                    prop_assert_eq!(level.scale, 1.0 / level.resolution as f64);
                }
            }

            #[test]
            fn test_finest_level_covers_image(
                width in 1u32..100_000,
                height in 1u32..100_000,
                tile_size in 1u32..2048
            ) {
                let geometry = PyramidGeometry::build(
                    &ImageDescriptor::new(width, height, tile_size),
                )
                .unwrap();

                let finest = geometry.levels().last().unwrap();
                prop_assert_eq!(finest.pixel_size, (width, height));
                let (cols, rows) = finest.tier_size;
                prop_assert!(u64::from(cols) * u64::from(tile_size) >= u64::from(width));
                prop_assert!(u64::from(rows) * u64::from(tile_size) >= u64::from(height));
            }

            #[test]
            fn test_exact_resolution_returns_level_scale(
                width in 257u32..100_000,
                height in 257u32..100_000
            ) {
                let geometry = PyramidGeometry::build(
                    &ImageDescriptor::new(width, height, 256),
                )
                .unwrap();

                for level in geometry.levels() {
                    let scale = geometry.scale_for_resolution(Some(level.resolution as f64));
                    prop_assert_eq!(scale, level.scale);
                }
            }
        }
    }
}
