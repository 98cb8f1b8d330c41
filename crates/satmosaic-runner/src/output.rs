//! Output naming and the JSON run report.

use crate::error::{Result, RunnerError};
use satmosaic_tiles::{Hemisphere, ImageType, MissingTile, MosaicReport, TileGrid, UtmZone};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Where the bounding box came from; names the output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionLabel {
    /// A GeoTIFF; labelled by its file stem.
    GeoTiff(PathBuf),
    /// A built-in dataset; labelled by its name.
    Dataset(String),
}

impl RegionLabel {
    /// Short label, e.g. `set1` or `T32UNA_20230601`.
    pub fn name(&self) -> String {
        match self {
            RegionLabel::GeoTiff(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "geotiff".to_string()),
            RegionLabel::Dataset(name) => name.clone(),
        }
    }
}

/// Suffix shared by output files: `{label}_z{zone}`.
///
/// Southern zones carry an `s`, e.g. `set1_z33s`.
pub fn output_suffix(label: &RegionLabel, zone: UtmZone) -> String {
    match zone.hemisphere {
        Hemisphere::North => format!("{}_z{}", label.name(), zone.number),
        Hemisphere::South => format!("{}_z{}s", label.name(), zone.number),
    }
}

/// Default image path: `stitched_image_{suffix}.png`.
pub fn default_output_path(label: &RegionLabel, zone: UtmZone) -> PathBuf {
    PathBuf::from(format!("stitched_image_{}.png", output_suffix(label, zone)))
}

/// Serializable summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Region label, e.g. `set1` or the GeoTIFF file stem.
    pub region: String,
    /// UTM zone the bounding box was projected from.
    pub zone: UtmZone,
    /// Imagery product that was requested.
    pub image_type: ImageType,
    /// Tile grid covering the region.
    pub grid: TileGrid,
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Tiles in the grid.
    pub tiles_total: u64,
    /// Tiles left as placeholder.
    pub tiles_missing: usize,
    /// Payload bytes downloaded, retries included.
    pub bytes_downloaded: u64,
    /// Retry attempts across all tiles.
    pub retries: u64,
    /// Wall-clock duration of the fetch and stitch.
    pub elapsed_secs: f64,
    /// Where the image was saved; `None` when no tile succeeded.
    pub output: Option<PathBuf>,
    /// One entry per missing tile, in raster order.
    pub missing: Vec<MissingTile>,
}

impl RunReport {
    /// Build the report for a finished run.
    pub fn new(
        label: &RegionLabel,
        zone: UtmZone,
        image_type: ImageType,
        report: &MosaicReport,
        output: Option<PathBuf>,
    ) -> Self {
        let canvas = &report.mosaic.canvas;
        Self {
            region: label.name(),
            zone,
            image_type,
            grid: *canvas.grid(),
            width: canvas.width(),
            height: canvas.height(),
            tiles_total: canvas.grid().tile_count(),
            tiles_missing: report.mosaic.missing.len(),
            bytes_downloaded: report.stats.bytes_downloaded,
            retries: report.stats.retries,
            elapsed_secs: report.elapsed.as_secs_f64(),
            output,
            missing: report.mosaic.missing.clone(),
        }
    }

    /// Write as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| RunnerError::Report {
            path: path.to_path_buf(),
            source,
        })
    }
}
