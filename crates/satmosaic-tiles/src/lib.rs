//! # satmosaic-tiles
//!
//! Builds a stitched satellite-imagery mosaic for a rectangle given in UTM
//! coordinates.
//!
//! The flow is:
//! 1. [`to_tile_bounds`] projects the box corners to WGS84 and then to a
//!    slippy-map [`TileGrid`] at the requested zoom.
//! 2. [`enumerate`] lists every tile in raster order.
//! 3. [`FetchOrchestrator`] fetches them on a bounded worker pool through a
//!    [`TileFetcher`], which retries transient failures and validates tiles.
//! 4. [`Stitcher`] places the tiles on one canvas, leaving missing cells as a
//!    placeholder and listing them.
//!
//! [`MosaicPipeline`] runs all four steps.
//!
//! ## Example
//!
//! ```no_run
//! use satmosaic_tiles::{HttpTileSource, MosaicConfig, MosaicPipeline, NamedRegion};
//!
//! let config = MosaicConfig::default();
//! let source = HttpTileSource::new(config.endpoints.clone(), config.request_timeout())?;
//! let bbox = NamedRegion::Set1.bounding_box(None)?;
//!
//! let report = MosaicPipeline::new(config, source).run(&bbox)?;
//! println!("{}", report.summary());
//! report.mosaic.canvas.image().save("mosaic.png").ok();
//! # Ok::<(), satmosaic_tiles::MosaicError>(())
//! ```

pub mod config;
pub mod coord;
mod error;
pub mod fetcher;
pub mod geotiff;
pub mod grid;
pub mod orchestrator;
pub mod pipeline;
pub mod region;
pub mod source;
pub mod stitch;
pub mod zone;

pub use config::MosaicConfig;
pub use coord::{to_tile_bounds, BoundingBox, TileGrid, TileIndex, MAX_ZOOM, TILE_PIXELS};
pub use error::{CorruptTile, MosaicError, TileError};
pub use fetcher::{FetchResult, FetchStats, RetryPolicy, TileFetcher, TileImage};
pub use geotiff::GeoTiffExtent;
pub use grid::enumerate;
pub use orchestrator::{CancelFlag, FetchOrchestrator, FetchProgress, FetchResults, ProgressCallback};
pub use pipeline::{MosaicPipeline, MosaicReport};
pub use region::NamedRegion;
pub use source::{HttpTileSource, ImageType, SourceError, TileEndpoints, TileSource};
pub use stitch::{Canvas, MissingTile, Mosaic, Stitcher};
pub use zone::{Hemisphere, UtmProjection, UtmZone};

/// Result type for mosaic operations.
pub type Result<T> = std::result::Result<T, MosaicError>;
