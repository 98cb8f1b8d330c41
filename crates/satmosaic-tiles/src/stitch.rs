//! Assemble fetched tiles into one canvas.

use crate::coord::{TileGrid, TileIndex};
use crate::error::{MosaicError, TileError};
use crate::fetcher::FetchResult;
use crate::orchestrator::FetchResults;
use crate::Result;
use image::{imageops, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Fully transparent RGBA.
pub const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Stitched raster covering a whole [`TileGrid`].
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    image: RgbaImage,
    grid: TileGrid,
    tile_size: u32,
}

impl Canvas {
    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Grid this canvas covers.
    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Tile edge length used for placement.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Borrow the pixels.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Take ownership of the pixels.
    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

/// A grid cell left as placeholder, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingTile {
    /// Cell index.
    pub index: TileIndex,
    /// Failure kind, see [`TileError::kind`].
    pub kind: String,
    /// Human readable reason.
    pub reason: String,
}

impl MissingTile {
    fn new(index: TileIndex, error: &TileError) -> Self {
        Self {
            index,
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }
}

/// Stitched canvas plus the cells that could not be filled.
#[derive(Debug, Clone, PartialEq)]
pub struct Mosaic {
    /// The stitched image.
    pub canvas: Canvas,
    /// Missing cells in raster order.
    pub missing: Vec<MissingTile>,
}

impl Mosaic {
    /// Whether every cell was filled.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Places tiles on a canvas at their grid offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stitcher {
    tile_size: u32,
    placeholder: Rgba<u8>,
}

impl Stitcher {
    /// Stitcher with a transparent placeholder.
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size,
            placeholder: Rgba(TRANSPARENT),
        }
    }

    /// Fill colour for missing cells.
    pub fn with_placeholder(mut self, rgba: [u8; 4]) -> Self {
        self.placeholder = Rgba(rgba);
        self
    }

    /// Build the canvas for `grid` from `results`.
    ///
    /// Cells without a successful result keep the placeholder and are listed
    /// in [`Mosaic::missing`]. Results outside the grid are ignored.
    pub fn stitch(&self, results: &FetchResults, grid: &TileGrid) -> Result<Mosaic> {
        let too_large = || MosaicError::CanvasTooLarge {
            columns: grid.columns(),
            rows: grid.rows(),
            tile_size: self.tile_size,
        };
        let width = grid.columns().checked_mul(self.tile_size).ok_or_else(too_large)?;
        let height = grid.rows().checked_mul(self.tile_size).ok_or_else(too_large)?;
        // Keep the buffer length addressable as well
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(4))
            .ok_or_else(too_large)?;

        let mut image = RgbaImage::from_pixel(width, height, self.placeholder);
        let mut missing = Vec::new();

        for index in grid {
            let Some((x, y)) = grid.pixel_offset(&index, self.tile_size) else {
                continue;
            };
            match results.get(&index) {
                Some(FetchResult::Success(tile)) => {
                    if tile.size() != self.tile_size || tile.pixels.height() != self.tile_size {
                        warn!("Tile {} has size {}, expected {}", index, tile.size(), self.tile_size);
                        missing.push(MissingTile {
                            index,
                            kind: "corrupt".to_string(),
                            reason: format!("tile is {}px, canvas expects {}px", tile.size(), self.tile_size),
                        });
                        continue;
                    }
                    imageops::replace(&mut image, &tile.pixels, x as i64, y as i64);
                }
                Some(FetchResult::Failure { reason, .. }) => missing.push(MissingTile::new(index, reason)),
                None => missing.push(MissingTile::new(index, &TileError::NoResult)),
            }
        }

        let stray = results.keys().filter(|index| !grid.contains(index)).count();
        if stray > 0 {
            debug!("Ignored {} results outside grid {}", stray, grid);
        }

        Ok(Mosaic {
            canvas: Canvas {
                image,
                grid: *grid,
                tile_size: self.tile_size,
            },
            missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::TileImage;

    const SIZE: u32 = 4;

    fn tile(index: TileIndex, color: [u8; 4]) -> FetchResult {
        FetchResult::Success(TileImage {
            index,
            pixels: RgbaImage::from_pixel(SIZE, SIZE, Rgba(color)),
        })
    }

    fn failed(index: TileIndex) -> FetchResult {
        FetchResult::Failure {
            index,
            reason: TileError::Network {
                attempts: 3,
                reason: "timed out".to_string(),
            },
        }
    }

    fn color_for(index: &TileIndex) -> [u8; 4] {
        [(index.column * 40 % 256) as u8, (index.row * 40 % 256) as u8, 200, 255]
    }

    /// 3x2 grid at columns 10..=12, rows 20..=21, with (11,20) failed.
    fn partial_results() -> (TileGrid, FetchResults) {
        let grid = TileGrid::new(8, 10, 12, 20, 21).unwrap();
        let results = grid
            .iter()
            .map(|index| {
                let result = if index.column == 11 && index.row == 20 {
                    failed(index)
                } else {
                    tile(index, color_for(&index))
                };
                (index, result)
            })
            .collect();
        (grid, results)
    }

    #[test]
    fn test_partial_grid() {
        let (grid, results) = partial_results();
        let mosaic = Stitcher::new(SIZE).stitch(&results, &grid).unwrap();
        let image = mosaic.canvas.image();

        assert_eq!((mosaic.canvas.width(), mosaic.canvas.height()), (3 * SIZE, 2 * SIZE));

        // Failed cell is transparent over its whole extent
        for y in 0..SIZE {
            for x in SIZE..2 * SIZE {
                assert_eq!(image.get_pixel(x, y), &Rgba(TRANSPARENT));
            }
        }
        // Neighbours hold their own tiles
        assert_eq!(image.get_pixel(0, 0), &Rgba(color_for(&TileIndex::new(10, 20, 8))));
        assert_eq!(image.get_pixel(2 * SIZE, 0), &Rgba(color_for(&TileIndex::new(12, 20, 8))));
        assert_eq!(
            image.get_pixel(2 * SIZE + 3, SIZE + 3),
            &Rgba(color_for(&TileIndex::new(12, 21, 8)))
        );

        assert_eq!(mosaic.missing.len(), 1);
        assert_eq!(mosaic.missing[0].index, TileIndex::new(11, 20, 8));
        assert_eq!(mosaic.missing[0].kind, "network");
        assert!(!mosaic.is_complete());
    }

    #[test]
    fn test_stitch_is_idempotent() {
        let (grid, results) = partial_results();
        let stitcher = Stitcher::new(SIZE);
        let a = stitcher.stitch(&results, &grid).unwrap();
        let b = stitcher.stitch(&results, &grid).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dimensions_independent_of_failures() {
        let grid = TileGrid::new(8, 10, 12, 20, 21).unwrap();
        let all_failed: FetchResults = grid.iter().map(|i| (i, failed(i))).collect();
        let mosaic = Stitcher::new(SIZE).stitch(&all_failed, &grid).unwrap();
        assert_eq!((mosaic.canvas.width(), mosaic.canvas.height()), (3 * SIZE, 2 * SIZE));
        assert_eq!(mosaic.missing.len(), 6);
    }

    #[test]
    fn test_absent_entries_are_no_result() {
        let grid = TileGrid::new(3, 0, 1, 0, 0).unwrap();
        let mut results = FetchResults::new();
        let first = TileIndex::new(0, 0, 3);
        results.insert(first, tile(first, [9, 9, 9, 255]));
        let mosaic = Stitcher::new(SIZE).stitch(&results, &grid).unwrap();
        assert_eq!(mosaic.missing.len(), 1);
        assert_eq!(mosaic.missing[0].index, TileIndex::new(1, 0, 3));
        assert_eq!(mosaic.missing[0].kind, "no_result");
    }

    #[test]
    fn test_results_outside_grid_ignored() {
        let grid = TileGrid::new(3, 0, 0, 0, 0).unwrap();
        let inside = TileIndex::new(0, 0, 3);
        let outside = TileIndex::new(5, 5, 3);
        let results: FetchResults = [
            (inside, tile(inside, [1, 1, 1, 255])),
            (outside, tile(outside, [2, 2, 2, 255])),
        ]
        .into_iter()
        .collect();
        let mosaic = Stitcher::new(SIZE).stitch(&results, &grid).unwrap();
        assert!(mosaic.is_complete());
        assert_eq!(mosaic.canvas.image().get_pixel(0, 0), &Rgba([1, 1, 1, 255]));
    }

    #[test]
    fn test_custom_placeholder() {
        let grid = TileGrid::new(3, 0, 0, 0, 0).unwrap();
        let mosaic = Stitcher::new(SIZE)
            .with_placeholder([255, 0, 255, 255])
            .stitch(&FetchResults::new(), &grid)
            .unwrap();
        assert_eq!(mosaic.canvas.image().get_pixel(1, 1), &Rgba([255, 0, 255, 255]));
    }

    #[test]
    fn test_canvas_too_large() {
        let grid = TileGrid::new(24, 0, (1 << 24) - 1, 0, 0).unwrap();
        let err = Stitcher::new(256).stitch(&FetchResults::new(), &grid).unwrap_err();
        assert!(matches!(err, MosaicError::CanvasTooLarge { .. }));
    }
}
