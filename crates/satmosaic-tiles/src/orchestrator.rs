//! Parallel tile fetching on a bounded worker pool.
//!
//! Every requested tile gets exactly one [`FetchResult`], whether it was
//! fetched, failed, or skipped because of cancellation. Workers return their
//! results and the map is built after the parallel section, so no key is
//! written twice and no lock is taken.

use crate::coord::TileIndex;
use crate::error::TileError;
use crate::fetcher::{FetchResult, FetchStats, TileFetcher};
use crate::source::{ImageType, TileSource};
use crate::Result;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Results for a batch of tiles, keyed and ordered by index.
pub type FetchResults = BTreeMap<TileIndex, FetchResult>;

/// Shared flag that stops new fetches from starting.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Fetches already in flight still complete.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the flag has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress report sent after each tile completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    /// Tiles finished so far, including this one.
    pub completed: usize,
    /// Tiles in the batch.
    pub total: usize,
    /// Tile that just finished.
    pub index: TileIndex,
    /// Whether it succeeded.
    pub succeeded: bool,
}

/// Callback for progress reports. Called from worker threads.
pub type ProgressCallback = Box<dyn Fn(FetchProgress) + Send + Sync>;

/// Runs a [`TileFetcher`] over many tiles with at most `workers` in flight.
pub struct FetchOrchestrator<S> {
    fetcher: TileFetcher<S>,
    pool: ThreadPool,
    workers: usize,
    cancel: CancelFlag,
    progress: Option<ProgressCallback>,
}

impl<S> std::fmt::Debug for FetchOrchestrator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("fetcher", &self.fetcher)
            .field("workers", &self.workers)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<S: TileSource> FetchOrchestrator<S> {
    /// Build an orchestrator with a dedicated pool of `workers` threads.
    pub fn new(fetcher: TileFetcher<S>, workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("tile-fetch-{}", i))
            .build()?;
        Ok(Self {
            fetcher,
            pool,
            workers,
            cancel: CancelFlag::new(),
            progress: None,
        })
    }

    /// Use an externally owned cancel flag.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Install a progress callback.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Worker pool size.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// The cancel flag checked before each fetch.
    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Counters of the underlying fetcher.
    pub fn stats(&self) -> FetchStats {
        self.fetcher.stats()
    }

    /// Fetch every distinct tile in `indices`.
    ///
    /// Failures never abort the batch. Duplicates are fetched once.
    pub fn fetch_all(&self, indices: &[TileIndex], image_type: ImageType) -> FetchResults {
        let unique: Vec<TileIndex> = indices.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let total = unique.len();
        if total < indices.len() {
            debug!("Dropped {} duplicate tile indices", indices.len() - total);
        }
        info!(
            "Fetching {} tiles ({}) with {} workers",
            total, image_type, self.workers
        );

        let completed = AtomicUsize::new(0);
        let results: Vec<FetchResult> = self.pool.install(|| {
            unique
                .par_iter()
                .map(|&index| {
                    let result = if self.cancel.is_cancelled() {
                        FetchResult::Failure {
                            index,
                            reason: TileError::Cancelled,
                        }
                    } else {
                        self.fetcher.fetch(index, image_type)
                    };

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(progress) = &self.progress {
                        progress(FetchProgress {
                            completed: done,
                            total,
                            index,
                            succeeded: result.is_success(),
                        });
                    }
                    result
                })
                .collect()
        });

        let map: FetchResults = results.into_iter().map(|r| (r.index(), r)).collect();
        let failed = map.values().filter(|r| !r.is_success()).count();
        info!("Fetched {}/{} tiles ({} failed)", total - failed, total, failed);
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileGrid;
    use crate::fetcher::RetryPolicy;
    use crate::grid::enumerate;
    use crate::source::SourceError;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    fn png() -> Vec<u8> {
        let img = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    fn orchestrator<F>(source: F, workers: usize) -> FetchOrchestrator<F>
    where
        F: Fn(&TileIndex, ImageType) -> std::result::Result<Vec<u8>, SourceError> + Send + Sync,
    {
        let fetcher = TileFetcher::new(source, RetryPolicy::new(1, Duration::ZERO), 2);
        FetchOrchestrator::new(fetcher, workers).unwrap()
    }

    fn grid_tiles() -> Vec<TileIndex> {
        enumerate(&TileGrid::new(10, 0, 4, 0, 3).unwrap())
    }

    #[test]
    fn test_every_tile_has_one_result() {
        let tiles = grid_tiles();
        let payload = png();
        let orch = orchestrator(move |_: &TileIndex, _: ImageType| Ok(payload.clone()), 4);
        let results = orch.fetch_all(&tiles, ImageType::SuperRes);
        assert_eq!(results.len(), tiles.len());
        assert!(tiles.iter().all(|t| results[t].is_success()));
        assert_eq!(orch.stats().tiles_downloaded, tiles.len());
    }

    #[test]
    fn test_failures_do_not_short_circuit() {
        let tiles = grid_tiles();
        let payload = png();
        let orch = orchestrator(
            move |index: &TileIndex, _: ImageType| {
                if index.column == 1 {
                    Err(SourceError::Status(500))
                } else {
                    Ok(payload.clone())
                }
            },
            3,
        );
        let results = orch.fetch_all(&tiles, ImageType::SuperRes);
        assert_eq!(results.len(), tiles.len());
        for (index, result) in &results {
            assert_eq!(result.index(), *index);
            assert_eq!(result.is_success(), index.column != 1);
        }
    }

    #[test]
    fn test_duplicates_fetched_once() {
        let calls = AtomicUsize::new(0);
        let payload = png();
        let orch = orchestrator(
            |_: &TileIndex, _: ImageType| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(payload.clone())
            },
            2,
        );
        let a = TileIndex::new(1, 1, 5);
        let b = TileIndex::new(2, 1, 5);
        let results = orch.fetch_all(&[a, b, a, a], ImageType::SuperRes);
        assert_eq!(results.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrency_bound() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let payload = png();
        let orch = orchestrator(
            |_: &TileIndex, _: ImageType| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(payload.clone())
            },
            3,
        );
        let results = orch.fetch_all(&grid_tiles(), ImageType::SuperRes);
        assert_eq!(results.len(), 20);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak in-flight {}", peak);
    }

    #[test]
    fn test_cancelled_before_start() {
        let tiles = grid_tiles();
        let payload = png();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let orch = orchestrator(move |_: &TileIndex, _: ImageType| Ok(payload.clone()), 2).with_cancel(cancel);
        let results = orch.fetch_all(&tiles, ImageType::SuperRes);
        assert_eq!(results.len(), tiles.len());
        assert!(results.values().all(|r| r.failure() == Some(&TileError::Cancelled)));
        assert_eq!(orch.stats().tiles_downloaded, 0);
    }

    #[test]
    fn test_cancel_mid_batch_keeps_map_complete() {
        let tiles = grid_tiles();
        let payload = png();
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let orch = orchestrator(
            move |_: &TileIndex, _: ImageType| {
                trigger.cancel();
                Ok(payload.clone())
            },
            1,
        )
        .with_cancel(cancel);
        let results = orch.fetch_all(&tiles, ImageType::SuperRes);
        assert_eq!(results.len(), tiles.len());
        // The single worker finishes its in-flight fetch, the rest are skipped
        let succeeded = results.values().filter(|r| r.is_success()).count();
        assert_eq!(succeeded, 1);
        let cancelled = results
            .values()
            .filter(|r| r.failure() == Some(&TileError::Cancelled))
            .count();
        assert_eq!(cancelled, tiles.len() - 1);
    }

    #[test]
    fn test_progress_reports_every_tile() {
        let tiles = grid_tiles();
        let payload = png();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let orch = orchestrator(move |_: &TileIndex, _: ImageType| Ok(payload.clone()), 4).with_progress(Box::new(
            move |p: FetchProgress| {
                sink.lock().unwrap().push(p);
            },
        ));
        orch.fetch_all(&tiles, ImageType::Sentinel2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), tiles.len());
        assert!(seen.iter().all(|p| p.total == tiles.len() && p.succeeded));
        let mut completed: Vec<_> = seen.iter().map(|p| p.completed).collect();
        completed.sort_unstable();
        assert_eq!(completed, (1..=tiles.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_batch() {
        let orch = orchestrator(|_: &TileIndex, _: ImageType| Ok(Vec::new()), 2);
        assert!(orch.fetch_all(&[], ImageType::SuperRes).is_empty());
    }
}
