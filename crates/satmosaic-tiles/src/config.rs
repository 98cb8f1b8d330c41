//! Mosaic configuration, loadable from YAML.

use crate::coord::MAX_ZOOM;
use crate::fetcher::RetryPolicy;
use crate::source::{ImageType, TileEndpoints};
use crate::stitch::TRANSPARENT;
use crate::{MosaicError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings for one mosaic run.
///
/// Every field has a default, so a YAML file only needs the values it changes:
///
/// ```yaml
/// zoom: 14
/// image_type: sentinel2
/// max_concurrent_fetches: 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MosaicConfig {
    /// Slippy-map zoom level.
    pub zoom: u8,
    /// Imagery product.
    pub image_type: ImageType,
    /// Worker pool size.
    pub max_concurrent_fetches: usize,
    /// Total attempts per tile. Zero is treated as one.
    pub max_retries_per_tile: u32,
    /// Base retry backoff in milliseconds.
    pub retry_backoff_ms: u64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Expected tile edge length in pixels.
    pub tile_size: u32,
    /// Largest grid that may be fetched.
    pub max_tiles: u64,
    /// Fill colour for missing tiles.
    pub placeholder_rgba: [u8; 4],
    /// Tile server URLs.
    pub endpoints: TileEndpoints,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            zoom: 15,
            image_type: ImageType::SuperRes,
            max_concurrent_fetches: 10,
            max_retries_per_tile: 3,
            retry_backoff_ms: 250,
            request_timeout_secs: 60,
            tile_size: 256,
            max_tiles: 10_000,
            placeholder_rgba: TRANSPARENT,
            endpoints: TileEndpoints::default(),
        }
    }
}

impl MosaicConfig {
    /// Parse a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.zoom > MAX_ZOOM {
            return Err(MosaicError::InvalidZoomLevel {
                zoom: self.zoom,
                max: MAX_ZOOM,
            });
        }
        if self.max_concurrent_fetches == 0 {
            return Err(MosaicError::InvalidConfig(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.tile_size == 0 {
            return Err(MosaicError::InvalidConfig("tile_size must be positive".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(MosaicError::InvalidConfig(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.max_tiles == 0 {
            return Err(MosaicError::InvalidConfig("max_tiles must be positive".to_string()));
        }
        if self.endpoints.extension.is_empty() {
            return Err(MosaicError::InvalidConfig("endpoints.extension is empty".to_string()));
        }
        Ok(())
    }

    /// Retry policy derived from the retry settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries_per_tile, Duration::from_millis(self.retry_backoff_ms))
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
