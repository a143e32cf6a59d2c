//! Coordinate system adapters.
//!
//! The engine works in three spaces:
//!
//! - **Local**: the tile pyramid's native coordinates (e.g. Spherical
//!   Mercator radians). Quad-tree node bounds live here.
//! - **Display**: the renderer's 3D space (a unit sphere for globes, the
//!   XY plane for flat maps).
//! - **Geographic**: latitude/longitude in degrees, used at the edges.
//!
//! Projection libraries are external collaborators; [`CoordSystem`] is the
//! narrow interface the engine consumes. Two adapters cover the common cases.

use std::f64::consts::PI;

use glam::{DVec2, DVec3};
use thiserror::Error;

use crate::geometry::Mbr;
use crate::quadtree::Node;

/// Maximum latitude representable in Web Mercator.
pub const MAX_LAT: f64 = 85.05112878;

/// Minimum latitude representable in Web Mercator.
pub const MIN_LAT: f64 = -85.05112878;

/// Minimum longitude.
pub const MIN_LON: f64 = -180.0;

/// Deepest level the geographic helpers accept.
pub const MAX_LEVEL: i32 = 30;

/// Errors from geographic conversions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("Invalid latitude: {0}")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0}")]
    InvalidLongitude(f64),

    #[error("Invalid level: {0}")]
    InvalidLevel(i32),
}

/// Conversion between a tile pyramid's local space and display space.
pub trait CoordSystem: Send + Sync {
    /// Full extent of the pyramid in local coordinates.
    fn bounds(&self) -> Mbr;

    /// Converts a local point (z is height) to display space.
    fn local_to_display(&self, local: DVec3) -> DVec3;

    /// Converts a display point back to local space.
    fn display_to_local(&self, display: DVec3) -> DVec3;

    /// True for flat maps, false for globes.
    fn is_flat(&self) -> bool;

    /// Unit "up" vector at a display point.
    fn normal_at(&self, display: DVec3) -> DVec3 {
        if self.is_flat() {
            DVec3::Z
        } else {
            display.normalize_or_zero()
        }
    }

    /// Local-space bounds of a node.
    fn bounds_for_node(&self, node: &Node) -> Mbr {
        let full = self.bounds();
        let cells = Node::cells_at_level(node.level) as f64;
        let size = DVec2::new(full.width() / cells, full.height() / cells);
        let ll = full.ll + size * DVec2::new(node.x as f64, node.y as f64);
        Mbr::new(ll, ll + size)
    }
}

// =============================================================================
// Flat map
// =============================================================================

/// Flat map where display space equals local space.
#[derive(Debug, Clone)]
pub struct FlatCoordSystem {
    extent: Mbr,
}

impl FlatCoordSystem {
    pub fn new(extent: Mbr) -> Self {
        Self { extent }
    }

    /// The Spherical Mercator extent laid out flat.
    pub fn web_mercator() -> Self {
        Self::new(Mbr::new(DVec2::splat(-PI), DVec2::splat(PI)))
    }
}

impl CoordSystem for FlatCoordSystem {
    fn bounds(&self) -> Mbr {
        self.extent
    }

    fn local_to_display(&self, local: DVec3) -> DVec3 {
        local
    }

    fn display_to_local(&self, display: DVec3) -> DVec3 {
        display
    }

    fn is_flat(&self) -> bool {
        true
    }
}

// =============================================================================
// Globe
// =============================================================================

/// Spherical Mercator tiles wrapped onto a unit sphere.
///
/// Local X is longitude in radians, local Y is the Mercator northing in
/// radians. Both span `-PI..PI`.
#[derive(Debug, Clone, Default)]
pub struct SphericalMercator;

impl SphericalMercator {
    pub fn new() -> Self {
        Self
    }
}

impl CoordSystem for SphericalMercator {
    fn bounds(&self) -> Mbr {
        Mbr::new(DVec2::splat(-PI), DVec2::splat(PI))
    }

    fn local_to_display(&self, local: DVec3) -> DVec3 {
        let lon = local.x;
        let lat = local.y.sinh().atan();
        let r = 1.0 + local.z;
        DVec3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()) * r
    }

    fn display_to_local(&self, display: DVec3) -> DVec3 {
        let r = display.length();
        if r == 0.0 {
            return DVec3::ZERO;
        }
        let lon = display.y.atan2(display.x);
        let lat = (display.z / r).clamp(-1.0, 1.0).asin();
        DVec3::new(lon, lat.tan().asinh(), r - 1.0)
    }

    fn is_flat(&self) -> bool {
        false
    }
}

// =============================================================================
// Geographic helpers
// =============================================================================

/// Converts geographic coordinates to the Web Mercator node containing them.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `level` - Quad-tree level (0 to 30)
///
/// The returned node counts rows from the south edge like every other node.
#[inline]
pub fn lat_lon_to_node(lat: f64, lon: f64, level: i32) -> Result<Node, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=180.0).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if !(0..=MAX_LEVEL).contains(&level) {
        return Err(CoordError::InvalidLevel(level));
    }

    let cells = Node::cells_at_level(level);
    let n = cells as f64;

    let col = ((lon + 180.0) / 360.0 * n) as i32;

    // Web Mercator row, counted from the north edge
    let lat_rad = lat * PI / 180.0;
    let row = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n) as i32;

    Ok(Node::new(col.min(cells - 1), cells - 1 - row.min(cells - 1), level))
}

/// Returns the latitude/longitude of a node's northwest corner.
#[inline]
pub fn node_to_lat_lon(node: &Node) -> (f64, f64) {
    let n = Node::cells_at_level(node.level) as f64;
    let row = node.flipped_y().y as f64;

    let lon = node.x as f64 / n * 360.0 - 180.0;

    let y = row / n;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    let lat = lat_rad * 180.0 / PI;

    (lat, lon)
}

/// Converts geographic degrees to Spherical Mercator local coordinates.
pub fn lat_lon_to_local(lat: f64, lon: f64) -> DVec2 {
    let lat_rad = lat.clamp(MIN_LAT, MAX_LAT).to_radians();
    DVec2::new(lon.to_radians(), lat_rad.tan().asinh())
}
