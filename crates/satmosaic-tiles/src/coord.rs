//! Projected bounding boxes, tile indices and the mapping between them.
//!
//! ## Tile Coordinate System
//!
//! Tiles follow the Slippy Map convention used by the tile server:
//! - `zoom` selects a global grid of `2^zoom x 2^zoom` tiles
//! - `column` runs from 0 at 180°W eastward
//! - `row` runs from 0 at ~85.05°N southward
//!
//! Positions are projected into a global Web-Mercator pixel space of
//! `TILE_PIXELS * 2^zoom` pixels per axis, then divided by the tile size and
//! floored.

use crate::zone::{UtmProjection, UtmZone};
use crate::{MosaicError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::f64::consts::PI;
use std::fmt;

/// Edge length of a tile in the server's global pixel space.
pub const TILE_PIXELS: u32 = 256;

/// Maximum supported zoom level.
pub const MAX_ZOOM: u8 = 24;

/// Latitude limit of the Web-Mercator projection (arctan(sinh(π))).
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// A rectangle in one UTM zone, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Zone the coordinates are expressed in.
    pub zone: UtmZone,
    /// West edge.
    pub min_easting: f64,
    /// South edge.
    pub min_northing: f64,
    /// East edge.
    pub max_easting: f64,
    /// North edge.
    pub max_northing: f64,
}

impl BoundingBox {
    /// Create a bounding box, checking that it is finite and ordered.
    pub fn new(
        zone: UtmZone,
        min_easting: f64,
        min_northing: f64,
        max_easting: f64,
        max_northing: f64,
    ) -> Result<Self> {
        let bbox = Self {
            zone,
            min_easting,
            min_northing,
            max_easting,
            max_northing,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Create a bounding box from upper-left and lower-right corners.
    ///
    /// Corners may come in any orientation; they are normalized to min/max.
    pub fn from_corners(zone: UtmZone, upper_left: (f64, f64), lower_right: (f64, f64)) -> Result<Self> {
        Self::new(
            zone,
            upper_left.0.min(lower_right.0),
            upper_left.1.min(lower_right.1),
            upper_left.0.max(lower_right.0),
            upper_left.1.max(lower_right.1),
        )
    }

    /// Check the box invariants.
    pub fn validate(&self) -> Result<()> {
        let values = [self.min_easting, self.min_northing, self.max_easting, self.max_northing];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(MosaicError::InvalidBoundingBox(format!("non-finite coordinate in {:?}", values)));
        }
        if self.min_easting > self.max_easting {
            return Err(MosaicError::InvalidBoundingBox(format!(
                "min_easting {} > max_easting {}",
                self.min_easting, self.max_easting
            )));
        }
        if self.min_northing > self.max_northing {
            return Err(MosaicError::InvalidBoundingBox(format!(
                "min_northing {} > max_northing {}",
                self.min_northing, self.max_northing
            )));
        }
        Ok(())
    }

    /// Upper-left corner (min easting, max northing).
    pub fn upper_left(&self) -> (f64, f64) {
        (self.min_easting, self.max_northing)
    }

    /// Lower-right corner (max easting, min northing).
    pub fn lower_right(&self) -> (f64, f64) {
        (self.max_easting, self.min_northing)
    }

    /// All four corners: UL, UR, LR, LL.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_easting, self.max_northing),
            (self.max_easting, self.max_northing),
            (self.max_easting, self.min_northing),
            (self.min_easting, self.min_northing),
        ]
    }
}

/// Address of one tile on the server's global grid.
///
/// Ordering is raster order: zoom, then row (top to bottom), then column
/// (left to right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileIndex {
    /// Column (x), increasing eastward.
    pub column: u32,
    /// Row (y), increasing southward.
    pub row: u32,
    /// Zoom level.
    pub zoom: u8,
}

impl TileIndex {
    /// Create a tile index.
    pub const fn new(column: u32, row: u32, zoom: u8) -> Self {
        Self { column, row, zoom }
    }
}

impl Ord for TileIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.zoom, self.row, self.column).cmp(&(other.zoom, other.row, other.column))
    }
}

impl PartialOrd for TileIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

/// Inclusive rectangle of tile indices at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileGrid {
    /// Zoom level.
    pub zoom: u8,
    /// First column.
    pub col_min: u32,
    /// Last column (inclusive).
    pub col_max: u32,
    /// First row.
    pub row_min: u32,
    /// Last row (inclusive).
    pub row_max: u32,
}

impl TileGrid {
    /// Create a grid, checking ordering and that indices exist at `zoom`.
    pub fn new(zoom: u8, col_min: u32, col_max: u32, row_min: u32, row_max: u32) -> Result<Self> {
        check_zoom(zoom)?;
        if col_min > col_max || row_min > row_max {
            return Err(MosaicError::EmptyGrid);
        }
        let last = tiles_per_axis(zoom) - 1;
        if col_max as u64 > last || row_max as u64 > last {
            return Err(MosaicError::InvalidBoundingBox(format!(
                "tile range exceeds the {}x{} grid at zoom {}",
                last + 1,
                last + 1,
                zoom
            )));
        }
        Ok(Self {
            zoom,
            col_min,
            col_max,
            row_min,
            row_max,
        })
    }

    /// Number of columns.
    pub fn columns(&self) -> u32 {
        self.col_max - self.col_min + 1
    }

    /// Number of rows.
    pub fn rows(&self) -> u32 {
        self.row_max - self.row_min + 1
    }

    /// Number of tiles in the grid.
    pub fn tile_count(&self) -> u64 {
        self.columns() as u64 * self.rows() as u64
    }

    /// Whether the index lies in this grid.
    pub fn contains(&self, index: &TileIndex) -> bool {
        index.zoom == self.zoom
            && (self.col_min..=self.col_max).contains(&index.column)
            && (self.row_min..=self.row_max).contains(&index.row)
    }

    /// Pixel offset of a tile's top-left corner on a canvas covering this grid.
    ///
    /// Returns `None` if the tile is outside the grid.
    pub fn pixel_offset(&self, index: &TileIndex, tile_size: u32) -> Option<(u64, u64)> {
        if !self.contains(index) {
            return None;
        }
        Some((
            (index.column - self.col_min) as u64 * tile_size as u64,
            (index.row - self.row_min) as u64 * tile_size as u64,
        ))
    }
}

impl fmt::Display for TileGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "z{} x[{}..={}] y[{}..={}]",
            self.zoom, self.col_min, self.col_max, self.row_min, self.row_max
        )
    }
}

/// Tiles along one axis at `zoom`.
pub fn tiles_per_axis(zoom: u8) -> u64 {
    1u64 << zoom
}

fn check_zoom(zoom: u8) -> Result<()> {
    if zoom > MAX_ZOOM {
        return Err(MosaicError::InvalidZoomLevel { zoom, max: MAX_ZOOM });
    }
    Ok(())
}

/// Project WGS84 lon/lat to global Web-Mercator pixel coordinates at `zoom`.
///
/// Latitude is clamped to ±[`MAX_MERCATOR_LAT`].
pub fn lon_lat_to_world_pixel(lon: f64, lat: f64, zoom: u8) -> (f64, f64) {
    let world = TILE_PIXELS as f64 * tiles_per_axis(zoom) as f64;
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);

    let x = (lon + 180.0) / 360.0 * world;
    let sin_lat = lat.to_radians().sin();
    let y = (0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI)) * world;
    (x, y)
}

/// Tile containing a WGS84 lon/lat at `zoom`, clamped to the global grid.
pub fn lon_lat_to_tile(lon: f64, lat: f64, zoom: u8) -> TileIndex {
    let (px, py) = lon_lat_to_world_pixel(lon, lat, zoom);
    let last = (tiles_per_axis(zoom) - 1) as f64;
    let column = (px / TILE_PIXELS as f64).floor().clamp(0.0, last) as u32;
    let row = (py / TILE_PIXELS as f64).floor().clamp(0.0, last) as u32;
    TileIndex { column, row, zoom }
}

/// Wrap a longitude difference into [-180, 180).
fn wrap_longitude(degrees: f64) -> f64 {
    (degrees + 180.0).rem_euclid(360.0) - 180.0
}

/// Map a projected bounding box to the covering tile grid at `zoom`.
///
/// All four corners are projected to tile indices and the grid is their
/// min/max. A box inside a single tile yields a one-tile grid.
///
/// Boxes that straddle the 180° meridian are rejected with
/// [`MosaicError::InvalidBoundingBox`]; a box wholly past it (possible at
/// the far edge of zones 1 and 60) maps onto the other side of the grid.
pub fn to_tile_bounds(bbox: &BoundingBox, zoom: u8) -> Result<TileGrid> {
    bbox.validate()?;
    check_zoom(zoom)?;
    let projection = UtmProjection::for_zone(bbox.zone)?;
    to_tile_bounds_with(&projection, bbox, zoom)
}

/// Same as [`to_tile_bounds`] with a prebuilt projection.
pub fn to_tile_bounds_with(projection: &UtmProjection, bbox: &BoundingBox, zoom: u8) -> Result<TileGrid> {
    if projection.zone() != bbox.zone {
        return Err(MosaicError::InvalidZone(format!(
            "box is in zone {} but projection is for zone {}",
            bbox.zone,
            projection.zone()
        )));
    }

    // Longitudes come back wrapped to [-180, 180]; unwrap them around the
    // central meridian so a box near 180° stays contiguous.
    let central = bbox.zone.central_meridian();
    let mut corners = [(0.0, 0.0); 4];
    for (corner, (easting, northing)) in corners.iter_mut().zip(bbox.corners()) {
        let (lon, lat) = projection.to_lon_lat(easting, northing)?;
        *corner = (central + wrap_longitude(lon - central), lat);
    }

    let west = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
    let east = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
    let shift = if west >= 180.0 {
        -360.0
    } else if east <= -180.0 {
        360.0
    } else {
        0.0
    };
    if west + shift < -180.0 || east + shift > 180.0 {
        return Err(MosaicError::InvalidBoundingBox(format!(
            "box spans {:.3}° to {:.3}° and crosses the antimeridian",
            west, east
        )));
    }

    let mut col_min = u32::MAX;
    let mut col_max = 0;
    let mut row_min = u32::MAX;
    let mut row_max = 0;

    for (lon, lat) in corners {
        let tile = lon_lat_to_tile(lon + shift, lat, zoom);
        col_min = col_min.min(tile.column);
        col_max = col_max.max(tile.column);
        row_min = row_min.min(tile.row);
        row_max = row_max.max(tile.row);
    }

    TileGrid::new(zoom, col_min, col_max, row_min, row_max)
}
