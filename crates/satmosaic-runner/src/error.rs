//! Runner errors.

use satmosaic_tiles::MosaicError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that end a runner invocation with a non-zero exit code.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Mosaic construction failed.
    #[error(transparent)]
    Mosaic(#[from] MosaicError),

    /// No tile could be fetched, so no image was written.
    #[error("all {total} tiles failed; no image written")]
    NoTilesFetched {
        /// Tiles in the grid.
        total: u64,
    },

    /// Writing the stitched image failed.
    #[error("failed to write {path}: {source}")]
    Image {
        /// Output path.
        path: PathBuf,
        /// Underlying error.
        source: image::ImageError,
    },

    /// Writing the report failed.
    #[error("failed to write report {path}: {source}")]
    Report {
        /// Report path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Report serialization failed.
    #[error("report serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ctrl-C handler could not be installed.
    #[error("failed to install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Result type for the runner.
pub type Result<T> = std::result::Result<T, RunnerError>;
