//! Error types for the tile crate.
//!
//! [`MosaicError`] is structural and fatal: it is raised before any tile is
//! requested. [`TileError`] describes why a single tile is missing and travels
//! as data inside [`FetchResult`](crate::FetchResult).

use thiserror::Error;

/// Fatal errors that abort a mosaic before or outside tile fetching.
#[derive(Debug, Error)]
pub enum MosaicError {
    /// The zone identifier has no registered projection formula.
    #[error("Invalid UTM zone: {0}")]
    InvalidZone(String),

    /// Bounding box is not finite or has min > max on an axis.
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// Zoom level outside the supported range.
    #[error("Invalid zoom level {zoom} (must be 0-{max})")]
    InvalidZoomLevel {
        /// Requested zoom.
        zoom: u8,
        /// Largest supported zoom.
        max: u8,
    },

    /// Tile grid contains no tiles.
    #[error("Tile grid is empty")]
    EmptyGrid,

    /// Grid exceeds the configured tile budget.
    #[error("Region needs {tiles} tiles at zoom {zoom}, exceeding max_tiles ({max})")]
    TooManyTiles {
        /// Tiles in the grid.
        tiles: u64,
        /// Zoom level of the grid.
        zoom: u8,
        /// Configured limit.
        max: u64,
    },

    /// Canvas pixel dimensions do not fit in `u32`.
    #[error("Canvas of {columns}x{rows} tiles at {tile_size}px exceeds the maximum image size")]
    CanvasTooLarge {
        /// Grid columns.
        columns: u32,
        /// Grid rows.
        rows: u32,
        /// Tile edge length in pixels.
        tile_size: u32,
    },

    /// Configuration value out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Coordinate transformation failed.
    #[error("Projection error: {0}")]
    Projection(String),

    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("Config parse error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    TiffDecode(#[from] tiff::TiffError),

    /// GeoTIFF is missing the georeferencing we need.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Worker pool could not be built.
    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Why a downloaded payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorruptTile {
    /// Bytes could not be decoded as an image.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Decoded image does not have the fixed tile size.
    #[error("expected {expected}x{expected} pixels, got {width}x{height}")]
    Dimensions {
        /// Expected edge length.
        expected: u32,
        /// Decoded width.
        width: u32,
        /// Decoded height.
        height: u32,
    },
}

/// Reason a single tile is missing from the mosaic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    /// Timeout, connection error or error status after all attempts.
    #[error("network failure after {attempts} attempt(s): {reason}")]
    Network {
        /// Attempts made.
        attempts: u32,
        /// Last error seen.
        reason: String,
    },

    /// The server has no tile at this index.
    #[error("tile not found on server")]
    NotFound,

    /// Payload failed validation.
    #[error("corrupt tile: {0}")]
    Corrupt(#[from] CorruptTile),

    /// Fetch never started because the run was cancelled.
    #[error("cancelled before fetch started")]
    Cancelled,

    /// No fetch result was recorded for this grid cell.
    #[error("no fetch result recorded")]
    NoResult,
}

impl TileError {
    /// Short, stable label used for metrics and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            TileError::Network { .. } => "network",
            TileError::NotFound => "not_found",
            TileError::Corrupt(_) => "corrupt",
            TileError::Cancelled => "cancelled",
            TileError::NoResult => "no_result",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_error_display() {
        let err = TileError::Network {
            attempts: 3,
            reason: "HTTP 503".to_string(),
        };
        assert_eq!(err.to_string(), "network failure after 3 attempt(s): HTTP 503");

        let err: TileError = CorruptTile::Dimensions {
            expected: 256,
            width: 512,
            height: 512,
        }
        .into();
        assert_eq!(err.to_string(), "corrupt tile: expected 256x256 pixels, got 512x512");
        assert_eq!(err.kind(), "corrupt");
    }

    #[test]
    fn test_mosaic_error_display() {
        let err = MosaicError::InvalidZoomLevel { zoom: 40, max: 24 };
        assert_eq!(err.to_string(), "Invalid zoom level 40 (must be 0-24)");
        assert!(MosaicError::InvalidZone("61N".into()).to_string().contains("61N"));
    }
}
