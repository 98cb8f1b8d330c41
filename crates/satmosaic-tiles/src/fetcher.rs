//! Single-tile retrieval with bounded retries and decode validation.
//!
//! A fetch never returns `Err`: exhausted retries and bad payloads become a
//! [`FetchResult::Failure`] so a partial grid can still be stitched.

use crate::coord::TileIndex;
use crate::error::{CorruptTile, TileError};
use crate::source::{ImageType, SourceError, TileSource};
use image::RgbaImage;
use satmosaic_metrics::{metric_defs, metrics};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// A decoded tile of exactly `tile_size x tile_size` RGBA pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct TileImage {
    /// Where the tile belongs.
    pub index: TileIndex,
    /// Decoded pixels.
    pub pixels: RgbaImage,
}

impl TileImage {
    /// Edge length in pixels.
    pub fn size(&self) -> u32 {
        self.pixels.width()
    }
}

/// Outcome of fetching one tile.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// Tile fetched and decoded.
    Success(TileImage),
    /// Tile is missing, with the reason.
    Failure {
        /// The tile that failed.
        index: TileIndex,
        /// Why it failed.
        reason: TileError,
    },
}

impl FetchResult {
    /// Index of the tile this result belongs to.
    pub fn index(&self) -> TileIndex {
        match self {
            FetchResult::Success(tile) => tile.index,
            FetchResult::Failure { index, .. } => *index,
        }
    }

    /// Whether the fetch succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success(_))
    }

    /// Failure reason, if any.
    pub fn failure(&self) -> Option<&TileError> {
        match self {
            FetchResult::Success(_) => None,
            FetchResult::Failure { reason, .. } => Some(reason),
        }
    }
}

/// How many times to try a tile and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per tile, at least 1.
    pub max_attempts: u32,
    /// Base backoff; attempt `n` waits `n * backoff` before the next try.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Policy from the `max_retries_per_tile` setting.
    ///
    /// The setting counts total attempts; zero still makes one attempt.
    pub fn new(max_retries_per_tile: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_retries_per_tile.max(1),
            backoff,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(250))
    }
}

/// Fetch statistics for this session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Tiles downloaded and decoded.
    pub tiles_downloaded: usize,
    /// Tiles that ended as failures.
    pub tiles_failed: usize,
    /// Total payload bytes received.
    pub bytes_downloaded: u64,
    /// Retry attempts made.
    pub retries: u64,
}

/// Retrieves and validates single tiles from a [`TileSource`].
///
/// Safe to share across worker threads; counters are atomic.
pub struct TileFetcher<S> {
    source: S,
    policy: RetryPolicy,
    tile_size: u32,
    tiles_downloaded: AtomicUsize,
    tiles_failed: AtomicUsize,
    bytes_downloaded: AtomicU64,
    retries: AtomicU64,
}

impl<S> std::fmt::Debug for TileFetcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileFetcher")
            .field("policy", &self.policy)
            .field("tile_size", &self.tile_size)
            .finish_non_exhaustive()
    }
}

impl<S: TileSource> TileFetcher<S> {
    /// Create a fetcher expecting square tiles of `tile_size` pixels.
    pub fn new(source: S, policy: RetryPolicy, tile_size: u32) -> Self {
        Self {
            source,
            policy,
            tile_size,
            tiles_downloaded: AtomicUsize::new(0),
            tiles_failed: AtomicUsize::new(0),
            bytes_downloaded: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    /// Expected tile edge length.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Retry policy in use.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Counters accumulated since creation.
    pub fn stats(&self) -> FetchStats {
        FetchStats {
            tiles_downloaded: self.tiles_downloaded.load(Ordering::Relaxed),
            tiles_failed: self.tiles_failed.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    /// Fetch, decode and validate one tile.
    pub fn fetch(&self, index: TileIndex, image_type: ImageType) -> FetchResult {
        let started = Instant::now();
        let labels = [image_type.as_str()];

        let result = match self.download(&index, image_type) {
            Ok(bytes) => match self.decode(index, &bytes) {
                Ok(tile) => FetchResult::Success(tile),
                Err(corrupt) => {
                    warn!("Tile {} rejected: {}", index, corrupt);
                    FetchResult::Failure {
                        index,
                        reason: corrupt.into(),
                    }
                }
            },
            Err(reason) => FetchResult::Failure { index, reason },
        };

        metrics::histogram!(
            metric_defs::TILE_FETCH_TIME.name,
            metric_defs::TILE_FETCH_TIME.label_values(&labels)
        )
            .record(started.elapsed().as_secs_f64() * 1000.0);
        match &result {
            FetchResult::Success(_) => {
                self.tiles_downloaded.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(
                    metric_defs::TILE_SUCCEEDED.name,
                    metric_defs::TILE_SUCCEEDED.label_values(&labels)
                )
                .increment(1);
            }
            FetchResult::Failure { reason, .. } => {
                self.tiles_failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(
                    metric_defs::TILE_FAILED.name,
                    metric_defs::TILE_FAILED.label_values(&[image_type.as_str(), reason.kind()])
                )
                .increment(1);
            }
        }
        result
    }

    /// Request the tile bytes, retrying retryable errors.
    fn download(&self, index: &TileIndex, image_type: ImageType) -> Result<Vec<u8>, TileError> {
        let labels = [image_type.as_str()];
        let mut attempt = 0;

        loop {
            attempt += 1;
            metrics::counter!(
                metric_defs::TILE_REQUESTS.name,
                metric_defs::TILE_REQUESTS.label_values(&labels)
            )
            .increment(1);

            let error = match self.source.fetch(index, image_type) {
                Ok(bytes) => {
                    trace!("Tile {} fetched ({} bytes, attempt {})", index, bytes.len(), attempt);
                    self.bytes_downloaded.fetch_add(bytes.len() as u64, Ordering::Relaxed);
                    metrics::histogram!(
                        metric_defs::TILE_BYTES.name,
                        metric_defs::TILE_BYTES.label_values(&labels)
                    )
                    .record(bytes.len() as f64);
                    return Ok(bytes);
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                debug!("Tile {} not available: {}", index, error);
                return Err(match error {
                    SourceError::NotFound => TileError::NotFound,
                    other => TileError::Network {
                        attempts: attempt,
                        reason: other.to_string(),
                    },
                });
            }

            if attempt >= self.policy.max_attempts {
                warn!("Tile {} failed after {} attempt(s): {}", index, attempt, error);
                return Err(TileError::Network {
                    attempts: attempt,
                    reason: error.to_string(),
                });
            }

            let delay = self.policy.delay_after(attempt);
            debug!(
                "Tile {} attempt {}/{} failed ({}), retrying in {:?}",
                index, attempt, self.policy.max_attempts, error, delay
            );
            self.retries.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(
                metric_defs::TILE_RETRIES.name,
                metric_defs::TILE_RETRIES.label_values(&labels)
            )
            .increment(1);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }

    /// Decode bytes into RGBA and check the tile size.
    fn decode(&self, index: TileIndex, bytes: &[u8]) -> Result<TileImage, CorruptTile> {
        let decoded = image::load_from_memory(bytes).map_err(|e| CorruptTile::Decode(e.to_string()))?;
        let pixels = decoded.to_rgba8();
        if pixels.width() != self.tile_size || pixels.height() != self.tile_size {
            return Err(CorruptTile::Dimensions {
                expected: self.tile_size,
                width: pixels.width(),
                height: pixels.height(),
            });
        }
        Ok(TileImage { index, pixels })
    }
}
