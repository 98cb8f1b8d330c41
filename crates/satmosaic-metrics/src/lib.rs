//! Metrics infrastructure for the satmosaic tile pipeline.
//!
//! This crate describes every metric emitted while fetching and stitching tiles.
//! It re-exports the `metrics` crate for convenience and declares each metric as
//! a structured [`Metric`] constant so names never drift between call sites.
//!
//! # Example
//!
//! ```rust,ignore
//! use satmosaic_metrics::{metric_defs, describe_metrics};
//!
//! // Register descriptions once the recorder is installed
//! describe_metrics();
//!
//! metrics::counter!(metric_defs::TILE_REQUESTS.name, "image_type" => "superres").increment(1);
//! ```
//!
//! # Metric Type
//!
//! ```rust
//! use satmosaic_metrics::{Metric, MetricKind};
//! use metrics::Unit;
//!
//! const MY_COUNTER: Metric = Metric::counter("my.counter")
//!     .with_description("A counter metric")
//!     .with_unit(Unit::Count)
//!     .with_labels(&["image_type"]);
//!
//! assert_eq!(MY_COUNTER.kind, MetricKind::Counter);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Label, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

/// A metric declaration with its metadata.
///
/// Use the const constructors to declare metrics at compile time.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "satmosaic.tiles.requests").
    pub name: &'static str,
    /// The kind of metric (counter, gauge, histogram).
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Pairs the declared label keys with `values`, in declaration order.
    ///
    /// Call sites pass one value per key so emitted series always carry
    /// exactly the labels the metric declares.
    pub fn label_values(&self, values: &[&'static str]) -> Vec<Label> {
        debug_assert_eq!(
            values.len(),
            self.labels.len(),
            "{} takes labels {:?}",
            self.name,
            self.labels
        );
        self.labels
            .iter()
            .zip(values)
            .map(|(key, value)| Label::from_static_parts(*key, *value))
            .collect()
    }

    /// Registers this metric's description with the installed recorder.
    ///
    /// Without a recorder this is a no-op.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the tile pipeline.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Label present on every fetch-scoped metric.
    pub const IMAGE_TYPE_LABEL: &str = "image_type";

    /// Label carrying the failure class of a tile.
    pub const REASON_LABEL: &str = "reason";

    // ========================================================================
    // Fetch Metrics
    // ========================================================================

    /// Network requests issued to the tile server, retries included.
    ///
    /// Labels: image_type
    pub const TILE_REQUESTS: Metric = Metric::counter("satmosaic.tiles.requests")
        .with_description("Tile requests issued to the tile server, retries included")
        .with_unit(Unit::Count)
        .with_labels(&[IMAGE_TYPE_LABEL]);

    /// Retry attempts after a failed request.
    ///
    /// Labels: image_type
    pub const TILE_RETRIES: Metric = Metric::counter("satmosaic.tiles.retries")
        .with_description("Retry attempts after a failed tile request")
        .with_unit(Unit::Count)
        .with_labels(&[IMAGE_TYPE_LABEL]);

    /// Tiles fetched and decoded successfully.
    ///
    /// Labels: image_type
    pub const TILE_SUCCEEDED: Metric = Metric::counter("satmosaic.tiles.succeeded")
        .with_description("Tiles fetched and decoded successfully")
        .with_unit(Unit::Count)
        .with_labels(&[IMAGE_TYPE_LABEL]);

    /// Tiles that ended as a failure entry.
    ///
    /// Labels: image_type, reason (network, not_found, corrupt, cancelled)
    pub const TILE_FAILED: Metric = Metric::counter("satmosaic.tiles.failed")
        .with_description("Tiles that could not be fetched or decoded")
        .with_unit(Unit::Count)
        .with_labels(&[IMAGE_TYPE_LABEL, REASON_LABEL]);

    /// Size of downloaded tile payloads.
    ///
    /// Labels: image_type
    pub const TILE_BYTES: Metric = Metric::histogram("satmosaic.tiles.bytes")
        .with_description("Downloaded tile payload size in bytes")
        .with_unit(Unit::Bytes)
        .with_labels(&[IMAGE_TYPE_LABEL]);

    /// Wall-clock time to fetch one tile, retries and backoff included.
    ///
    /// Labels: image_type
    pub const TILE_FETCH_TIME: Metric = Metric::histogram("satmosaic.tiles.fetch_time_ms")
        .with_description("Wall-clock time to fetch one tile including retries")
        .with_unit(Unit::Milliseconds)
        .with_labels(&[IMAGE_TYPE_LABEL]);

    // ========================================================================
    // Mosaic Metrics
    // ========================================================================

    /// Tiles in the grid of the most recent mosaic.
    pub const MOSAIC_TILES: Metric = Metric::gauge("satmosaic.mosaic.tiles")
        .with_description("Number of tiles in the most recent mosaic grid")
        .with_unit(Unit::Count);

    /// Tiles left as placeholder in the most recent mosaic.
    pub const MOSAIC_MISSING: Metric = Metric::gauge("satmosaic.mosaic.missing")
        .with_description("Tiles left as placeholder in the most recent mosaic")
        .with_unit(Unit::Count);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        &TILE_REQUESTS,
        &TILE_RETRIES,
        &TILE_SUCCEEDED,
        &TILE_FAILED,
        &TILE_BYTES,
        &TILE_FETCH_TIME,
        &MOSAIC_TILES,
        &MOSAIC_MISSING,
    ];
}

/// Describes all metrics used by the pipeline.
///
/// Call once at startup, after installing a recorder, so exporters can
/// publish descriptions and units.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
