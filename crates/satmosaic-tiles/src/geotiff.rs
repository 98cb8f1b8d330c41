//! Read a UTM bounding box from a GeoTIFF's georeferencing tags.
//!
//! Only the tags are read, never the raster data. The extent comes from
//! `ModelTiepoint` + `ModelPixelScale`, or from `ModelTransformation` when
//! those are absent. The zone comes from `ProjectedCSTypeGeoKey` or, failing
//! that, from a "UTM zone NN" citation in `GeoAsciiParams`.

use crate::coord::BoundingBox;
use crate::zone::{Hemisphere, UtmZone};
use crate::{MosaicError, Result};
use std::io::{Read, Seek};
use std::path::Path;
use tiff::decoder::Decoder;
use tiff::tags::Tag;
use tracing::debug;

/// GeoKey holding the EPSG code of a projected CRS.
pub const PROJECTED_CS_TYPE_GEO_KEY: u64 = 3072;

/// Georeferenced footprint of a GeoTIFF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTiffExtent {
    /// Zone found in the file, if any.
    pub zone: Option<UtmZone>,
    /// Upper-left corner (easting, northing).
    pub upper_left: (f64, f64),
    /// Lower-right corner (easting, northing).
    pub lower_right: (f64, f64),
    /// Raster width in pixels.
    pub width: u32,
    /// Raster height in pixels.
    pub height: u32,
}

impl GeoTiffExtent {
    /// Read the extent and zone of a GeoTIFF file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let mut decoder = Decoder::new(file)?;
        let extent = Self::from_decoder(&mut decoder)?;
        debug!(
            "GeoTIFF {}: {}x{} px, UL {:?}, LR {:?}, zone {:?}",
            path.display(),
            extent.width,
            extent.height,
            extent.upper_left,
            extent.lower_right,
            extent.zone
        );
        Ok(extent)
    }

    fn from_decoder<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Self> {
        let (width, height) = decoder.dimensions()?;

        let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok();
        let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok();
        let (upper_left, lower_right) = match (tiepoint, scale) {
            (Some(tiepoint), Some(scale)) => extent_from_tiepoint(&tiepoint, &scale, width, height)?,
            _ => {
                let matrix = decoder.get_tag_f64_vec(Tag::ModelTransformationTag).map_err(|_| {
                    MosaicError::InvalidGeoTiff(
                        "no ModelTiepoint/ModelPixelScale or ModelTransformation tags".to_string(),
                    )
                })?;
                extent_from_transformation(&matrix, width, height)?
            }
        };

        let zone = decoder
            .get_tag_u64_vec(Tag::GeoKeyDirectoryTag)
            .ok()
            .and_then(|keys| zone_from_geokeys(&keys))
            .or_else(|| {
                decoder
                    .get_tag_ascii_string(Tag::GeoAsciiParamsTag)
                    .ok()
                    .and_then(|text| zone_from_citation(&text))
            });

        Ok(Self {
            zone,
            upper_left,
            lower_right,
            width,
            height,
        })
    }

    /// Bounding box in the file's zone, or in `zone_override` when given.
    ///
    /// Fails with [`MosaicError::InvalidZone`] if neither is available.
    pub fn bounding_box(&self, zone_override: Option<UtmZone>) -> Result<BoundingBox> {
        let zone = zone_override.or(self.zone).ok_or_else(|| {
            MosaicError::InvalidZone("GeoTIFF has no UTM zone; pass one explicitly".to_string())
        })?;
        BoundingBox::from_corners(zone, self.upper_left, self.lower_right)
    }
}

/// Corners from a tiepoint `[i, j, k, x, y, z]` and pixel scale `[sx, sy, sz]`.
pub fn extent_from_tiepoint(
    tiepoint: &[f64],
    scale: &[f64],
    width: u32,
    height: u32,
) -> Result<((f64, f64), (f64, f64))> {
    if tiepoint.len() < 6 || scale.len() < 2 {
        return Err(MosaicError::InvalidGeoTiff(format!(
            "short ModelTiepoint ({}) or ModelPixelScale ({})",
            tiepoint.len(),
            scale.len()
        )));
    }
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    let (sx, sy) = (scale[0], scale[1]);
    if sx <= 0.0 || sy <= 0.0 {
        return Err(MosaicError::InvalidGeoTiff(format!("non-positive pixel scale ({}, {})", sx, sy)));
    }

    // Raster rows run southward
    let ulx = x - i * sx;
    let uly = y + j * sy;
    let lrx = ulx + width as f64 * sx;
    let lry = uly - height as f64 * sy;
    Ok(((ulx, uly), (lrx, lry)))
}

/// Corners from a row-major 4x4 `ModelTransformation` matrix.
pub fn extent_from_transformation(matrix: &[f64], width: u32, height: u32) -> Result<((f64, f64), (f64, f64))> {
    if matrix.len() < 16 {
        return Err(MosaicError::InvalidGeoTiff(format!(
            "ModelTransformation has {} values, expected 16",
            matrix.len()
        )));
    }
    let apply = |i: f64, j: f64| (matrix[0] * i + matrix[1] * j + matrix[3], matrix[4] * i + matrix[5] * j + matrix[7]);
    let (w, h) = (width as f64, height as f64);
    let corners = [apply(0.0, 0.0), apply(w, 0.0), apply(w, h), apply(0.0, h)];

    let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
    let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
    let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
    let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);
    Ok(((min_x, max_y), (max_x, min_y)))
}

/// Zone from the `ProjectedCSTypeGeoKey` of a GeoKey directory.
///
/// The directory is a 4-value header followed by
/// `[key_id, tag_location, count, value]` entries.
pub fn zone_from_geokeys(keys: &[u64]) -> Option<UtmZone> {
    if keys.len() < 4 {
        return None;
    }
    keys[4..]
        .chunks_exact(4)
        .find(|entry| entry[0] == PROJECTED_CS_TYPE_GEO_KEY && entry[1] == 0)
        .and_then(|entry| u32::try_from(entry[3]).ok())
        .and_then(UtmZone::from_epsg)
}

/// Zone from a citation such as `WGS 84 / UTM zone 32N|`.
pub fn zone_from_citation(text: &str) -> Option<UtmZone> {
    let lower = text.to_ascii_lowercase();
    let start = lower.find("utm zone")? + "utm zone".len();
    let rest = text[start..].trim_start();

    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let number: u8 = digits.parse().ok()?;
    let hemisphere = match rest[digits.len()..].chars().next() {
        Some('S') | Some('s') => Hemisphere::South,
        _ => Hemisphere::North,
    };
    let zone = UtmZone { number, hemisphere };
    zone.is_registered().then_some(zone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tiff::encoder::{colortype, TiffEncoder};

    #[test]
    fn test_tiepoint_extent() {
        let tiepoint = [0.0, 0.0, 0.0, 605_020.0, 5_546_440.0, 0.0];
        let scale = [10.0, 10.0, 0.0];
        let (ul, lr) = extent_from_tiepoint(&tiepoint, &scale, 422, 422).unwrap();
        assert_eq!(ul, (605_020.0, 5_546_440.0));
        assert_abs_diff_eq!(lr.0, 609_240.0);
        assert_abs_diff_eq!(lr.1, 5_542_220.0);
    }

    #[test]
    fn test_tiepoint_not_at_origin() {
        // Tiepoint at pixel (2, 3)
        let tiepoint = [2.0, 3.0, 0.0, 1_020.0, 4_970.0, 0.0];
        let (ul, lr) = extent_from_tiepoint(&tiepoint, &[10.0, 10.0], 10, 10).unwrap();
        assert_eq!(ul, (1_000.0, 5_000.0));
        assert_eq!(lr, (1_100.0, 4_900.0));
    }

    #[test]
    fn test_short_tiepoint_rejected() {
        let err = extent_from_tiepoint(&[0.0, 0.0, 0.0], &[10.0, 10.0], 1, 1).unwrap_err();
        assert!(matches!(err, MosaicError::InvalidGeoTiff(_)));
    }

    #[test]
    fn test_transformation_extent() {
        #[rustfmt::skip]
        let matrix = [
            10.0, 0.0, 0.0, 443_040.0,
            0.0, -10.0, 0.0, 5_834_800.0,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        let (ul, lr) = extent_from_transformation(&matrix, 418, 420).unwrap();
        assert_eq!(ul, (443_040.0, 5_834_800.0));
        assert_eq!(lr, (447_220.0, 5_830_600.0));
    }

    #[test]
    fn test_zone_from_geokeys() {
        #[rustfmt::skip]
        let keys = [
            1, 1, 0, 2,
            1024, 0, 1, 1,
            3072, 0, 1, 32733,
        ];
        assert_eq!(zone_from_geokeys(&keys), Some(UtmZone::south(33)));

        let geographic = [1, 1, 0, 1, 2048, 0, 1, 4326];
        assert_eq!(zone_from_geokeys(&geographic), None);
        assert_eq!(zone_from_geokeys(&[]), None);
    }

    #[test]
    fn test_zone_from_citation() {
        assert_eq!(zone_from_citation("WGS 84 / UTM zone 32N|WGS 84|"), Some(UtmZone::north(32)));
        assert_eq!(zone_from_citation("UTM Zone 19S"), Some(UtmZone::south(19)));
        assert_eq!(zone_from_citation("utm zone 7"), Some(UtmZone::north(7)));
        assert_eq!(zone_from_citation("UTM zone 99N"), None);
        assert_eq!(zone_from_citation("WGS 84|"), None);
    }

    #[test]
    fn test_bounding_box_needs_zone() {
        let extent = GeoTiffExtent {
            zone: None,
            upper_left: (0.0, 10.0),
            lower_right: (10.0, 0.0),
            width: 1,
            height: 1,
        };
        assert!(matches!(extent.bounding_box(None), Err(MosaicError::InvalidZone(_))));
        let bbox = extent.bounding_box(Some(UtmZone::north(31))).unwrap();
        assert_eq!(bbox.zone, UtmZone::north(31));
    }

    #[test]
    fn test_override_wins_over_file_zone() {
        let extent = GeoTiffExtent {
            zone: Some(UtmZone::north(32)),
            upper_left: (0.0, 10.0),
            lower_right: (10.0, 0.0),
            width: 1,
            height: 1,
        };
        assert_eq!(extent.bounding_box(None).unwrap().zone, UtmZone::north(32));
        assert_eq!(extent.bounding_box(Some(UtmZone::north(33))).unwrap().zone, UtmZone::north(33));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("T32UNA.tif");
        {
            let file = std::fs::File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(file).unwrap();
            let mut image = encoder.new_image::<colortype::Gray8>(4, 2).unwrap();
            let scale = [10.0f64, 10.0, 0.0];
            let tiepoint = [0.0f64, 0.0, 0.0, 605_020.0, 5_546_440.0, 0.0];
            let geokeys: [u16; 8] = [1, 1, 0, 1, 3072, 0, 1, 32632];
            image
                .encoder()
                .write_tag(Tag::ModelPixelScaleTag, scale.as_slice())
                .unwrap();
            image
                .encoder()
                .write_tag(Tag::ModelTiepointTag, tiepoint.as_slice())
                .unwrap();
            image
                .encoder()
                .write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())
                .unwrap();
            image.write_data(&[0u8; 8]).unwrap();
        }

        let extent = GeoTiffExtent::from_file(&path).unwrap();
        assert_eq!((extent.width, extent.height), (4, 2));
        assert_eq!(extent.zone, Some(UtmZone::north(32)));
        assert_eq!(extent.upper_left, (605_020.0, 5_546_440.0));
        assert_eq!(extent.lower_right, (605_060.0, 5_546_420.0));
    }

    #[test]
    fn test_missing_file() {
        let err = GeoTiffExtent::from_file("/nonexistent/input.tif").unwrap_err();
        assert!(matches!(err, MosaicError::Io(_)));
    }
}
