//! Tile sources: where raw tile bytes come from.
//!
//! [`TileSource`] is the transport seam. [`HttpTileSource`] talks to the tile
//! server; tests plug in closures.

use crate::coord::TileIndex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Base URL of the super-resolution mosaic.
pub const SUPERRES_BASE_URL: &str = "https://se-tile-api.allen.ai/mosaic/superres/sr2023/tci";

/// Base URL of the Sentinel-2 mosaic.
pub const SENTINEL2_BASE_URL: &str = "https://se-tile-api.allen.ai/mosaic/sentinel2/sr2023/tci";

/// Imagery product to request. Selects the server path only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    /// Super-resolved imagery.
    #[default]
    SuperRes,
    /// Sentinel-2 true colour.
    Sentinel2,
}

impl ImageType {
    /// Lowercase name, as used in configs and metric labels.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ImageType::SuperRes => "superres",
            ImageType::Sentinel2 => "sentinel2",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "superres" => Ok(ImageType::SuperRes),
            "sentinel2" => Ok(ImageType::Sentinel2),
            other => Err(format!("unknown image type '{}' (expected superres or sentinel2)", other)),
        }
    }
}

/// URL table for the tile server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TileEndpoints {
    /// Base URL for [`ImageType::SuperRes`].
    pub superres: String,
    /// Base URL for [`ImageType::Sentinel2`].
    pub sentinel2: String,
    /// File extension appended to the row.
    pub extension: String,
}

impl Default for TileEndpoints {
    fn default() -> Self {
        Self {
            superres: SUPERRES_BASE_URL.to_string(),
            sentinel2: SENTINEL2_BASE_URL.to_string(),
            extension: "webp".to_string(),
        }
    }
}

impl TileEndpoints {
    /// Base URL for an image type.
    pub fn base_url(&self, image_type: ImageType) -> &str {
        match image_type {
            ImageType::SuperRes => &self.superres,
            ImageType::Sentinel2 => &self.sentinel2,
        }
    }

    /// Full URL of one tile: `{base}/{z}/{x}/{y}.{ext}`.
    pub fn tile_url(&self, index: &TileIndex, image_type: ImageType) -> String {
        format!(
            "{}/{}/{}/{}.{}",
            self.base_url(image_type).trim_end_matches('/'),
            index.zoom,
            index.column,
            index.row,
            self.extension
        )
    }
}

/// Transport-level failure for one request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The server has no tile here. Not retried.
    #[error("HTTP 404 Not Found")]
    NotFound,

    /// Any other non-success status.
    #[error("HTTP {0}")]
    Status(u16),

    /// Timeout, connection or body read error.
    #[error("transport error: {0}")]
    Transport(String),
}

impl SourceError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SourceError::NotFound)
    }
}

/// Something that can produce the raw bytes of a tile.
///
/// Implementations must be shareable across worker threads.
pub trait TileSource: Send + Sync {
    /// Retrieve the encoded image bytes for one tile.
    fn fetch(&self, index: &TileIndex, image_type: ImageType) -> Result<Vec<u8>, SourceError>;
}

impl<F> TileSource for F
where
    F: Fn(&TileIndex, ImageType) -> Result<Vec<u8>, SourceError> + Send + Sync,
{
    fn fetch(&self, index: &TileIndex, image_type: ImageType) -> Result<Vec<u8>, SourceError> {
        self(index, image_type)
    }
}

/// Tile source backed by a blocking HTTP client.
pub struct HttpTileSource {
    client: reqwest::blocking::Client,
    endpoints: TileEndpoints,
}

impl fmt::Debug for HttpTileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTileSource")
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl HttpTileSource {
    /// Create a source with a per-request timeout.
    pub fn new(endpoints: TileEndpoints, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("satmosaic/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, endpoints })
    }

    /// The URL table in use.
    pub fn endpoints(&self) -> &TileEndpoints {
        &self.endpoints
    }
}

impl TileSource for HttpTileSource {
    fn fetch(&self, index: &TileIndex, image_type: ImageType) -> Result<Vec<u8>, SourceError> {
        let url = self.endpoints.tile_url(index, image_type);
        tracing::trace!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound);
        }
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_url() {
        let endpoints = TileEndpoints::default();
        let index = TileIndex::new(17_247, 11_102, 15);
        assert_eq!(
            endpoints.tile_url(&index, ImageType::SuperRes),
            "https://se-tile-api.allen.ai/mosaic/superres/sr2023/tci/15/17247/11102.webp"
        );
        assert_eq!(
            endpoints.tile_url(&index, ImageType::Sentinel2),
            "https://se-tile-api.allen.ai/mosaic/sentinel2/sr2023/tci/15/17247/11102.webp"
        );
    }

    #[test]
    fn test_tile_url_trailing_slash() {
        let endpoints = TileEndpoints {
            superres: "http://localhost:8080/tiles/".to_string(),
            extension: "png".to_string(),
            ..TileEndpoints::default()
        };
        assert_eq!(
            endpoints.tile_url(&TileIndex::new(1, 2, 3), ImageType::SuperRes),
            "http://localhost:8080/tiles/3/1/2.png"
        );
    }

    #[test]
    fn test_image_type_parse() {
        assert_eq!("superres".parse::<ImageType>().unwrap(), ImageType::SuperRes);
        assert_eq!("Sentinel2".parse::<ImageType>().unwrap(), ImageType::Sentinel2);
        assert!("landsat".parse::<ImageType>().is_err());
        assert_eq!(ImageType::default(), ImageType::SuperRes);
    }

    #[test]
    fn test_retryable() {
        assert!(!SourceError::NotFound.is_retryable());
        assert!(SourceError::Status(503).is_retryable());
        assert!(SourceError::Transport("timed out".into()).is_retryable());
    }

    #[test]
    fn test_closure_source() {
        let source = |index: &TileIndex, _: ImageType| -> Result<Vec<u8>, SourceError> {
            Ok(vec![index.zoom])
        };
        assert_eq!(source.fetch(&TileIndex::new(0, 0, 7), ImageType::SuperRes), Ok(vec![7]));
    }
}
