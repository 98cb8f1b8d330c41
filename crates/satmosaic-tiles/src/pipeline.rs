//! End-to-end mosaic construction: map, plan, fetch, stitch.

use crate::config::MosaicConfig;
use crate::coord::{to_tile_bounds, BoundingBox, TileGrid};
use crate::fetcher::{FetchStats, TileFetcher};
use crate::grid::enumerate;
use crate::orchestrator::{CancelFlag, FetchOrchestrator, ProgressCallback};
use crate::source::TileSource;
use crate::stitch::{Mosaic, Stitcher};
use crate::{MosaicError, Result};
use satmosaic_metrics::{metric_defs, metrics};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct MosaicReport {
    /// Canvas and missing cells.
    pub mosaic: Mosaic,
    /// Fetch counters for the run.
    pub stats: FetchStats,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl MosaicReport {
    /// Grid the canvas covers.
    pub fn grid(&self) -> &TileGrid {
        self.mosaic.canvas.grid()
    }

    /// Whether every tile made it onto the canvas.
    pub fn complete(&self) -> bool {
        self.mosaic.is_complete()
    }

    /// Whether at least one tile made it onto the canvas.
    pub fn any_succeeded(&self) -> bool {
        (self.mosaic.missing.len() as u64) < self.grid().tile_count()
    }

    /// One-line outcome, e.g. `mosaic complete with 1/24 tiles missing`.
    pub fn summary(&self) -> String {
        format!(
            "mosaic complete with {}/{} tiles missing",
            self.mosaic.missing.len(),
            self.grid().tile_count()
        )
    }
}

/// Builds a mosaic for a bounding box from a tile source.
pub struct MosaicPipeline<S> {
    config: MosaicConfig,
    source: S,
    cancel: CancelFlag,
    progress: Option<ProgressCallback>,
}

impl<S> std::fmt::Debug for MosaicPipeline<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MosaicPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: TileSource> MosaicPipeline<S> {
    /// Create a pipeline.
    pub fn new(config: MosaicConfig, source: S) -> Self {
        Self {
            config,
            source,
            cancel: CancelFlag::new(),
            progress: None,
        }
    }

    /// Use an externally owned cancel flag.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report per-tile progress.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Settings in use.
    pub fn config(&self) -> &MosaicConfig {
        &self.config
    }

    /// Map the box to a grid and check it against the tile budget.
    ///
    /// Runs no network requests.
    pub fn plan(&self, bbox: &BoundingBox) -> Result<TileGrid> {
        self.config.validate()?;
        let grid = to_tile_bounds(bbox, self.config.zoom)?;
        let tiles = grid.tile_count();
        if tiles == 0 {
            return Err(MosaicError::EmptyGrid);
        }
        if tiles > self.config.max_tiles {
            return Err(MosaicError::TooManyTiles {
                tiles,
                zoom: grid.zoom,
                max: self.config.max_tiles,
            });
        }
        Ok(grid)
    }

    /// Build the mosaic. Consumes the pipeline.
    ///
    /// Only structural problems are errors; individual tile failures end up
    /// in [`Mosaic::missing`].
    pub fn run(self, bbox: &BoundingBox) -> Result<MosaicReport> {
        let started = Instant::now();
        let grid = self.plan(bbox)?;
        let tiles = enumerate(&grid);
        if tiles.is_empty() {
            return Err(MosaicError::EmptyGrid);
        }
        info!(
            "Zone {} box maps to {} ({} tiles, {}x{} px)",
            bbox.zone,
            grid,
            tiles.len(),
            grid.columns() as u64 * self.config.tile_size as u64,
            grid.rows() as u64 * self.config.tile_size as u64
        );

        let stitcher = Stitcher::new(self.config.tile_size).with_placeholder(self.config.placeholder_rgba);
        let fetcher = TileFetcher::new(self.source, self.config.retry_policy(), self.config.tile_size);
        let mut orchestrator =
            FetchOrchestrator::new(fetcher, self.config.max_concurrent_fetches)?.with_cancel(self.cancel);
        if let Some(progress) = self.progress {
            orchestrator = orchestrator.with_progress(progress);
        }

        let results = orchestrator.fetch_all(&tiles, self.config.image_type);
        let mosaic = stitcher.stitch(&results, &grid)?;

        metrics::gauge!(metric_defs::MOSAIC_TILES.name).set(tiles.len() as f64);
        metrics::gauge!(metric_defs::MOSAIC_MISSING.name).set(mosaic.missing.len() as f64);

        let report = MosaicReport {
            mosaic,
            stats: orchestrator.stats(),
            elapsed: started.elapsed(),
        };
        if report.complete() {
            info!("{} in {:.1?}", report.summary(), report.elapsed);
        } else {
            warn!("{} in {:.1?}", report.summary(), report.elapsed);
        }
        Ok(report)
    }
}
