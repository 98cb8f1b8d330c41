//! UTM zone identifiers and their inverse projection to WGS84.

use crate::{MosaicError, Result};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Smallest UTM zone number.
pub const MIN_ZONE: u8 = 1;

/// Largest UTM zone number.
pub const MAX_ZONE: u8 = 60;

const WGS84_LONLAT: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Hemisphere of a UTM zone (selects the false northing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    /// Northern hemisphere (EPSG 326xx).
    North,
    /// Southern hemisphere (EPSG 327xx).
    South,
}

/// A single UTM zone, e.g. `32N`.
///
/// Values are plain data; whether a projection exists for them is checked when
/// a [`UtmProjection`] is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtmZone {
    /// Zone number (1-60 for a registered zone).
    pub number: u8,
    /// Hemisphere.
    pub hemisphere: Hemisphere,
}

impl UtmZone {
    /// Northern-hemisphere zone.
    pub const fn north(number: u8) -> Self {
        Self {
            number,
            hemisphere: Hemisphere::North,
        }
    }

    /// Southern-hemisphere zone.
    pub const fn south(number: u8) -> Self {
        Self {
            number,
            hemisphere: Hemisphere::South,
        }
    }

    /// Whether a projection formula is registered for this zone.
    pub fn is_registered(&self) -> bool {
        (MIN_ZONE..=MAX_ZONE).contains(&self.number)
    }

    /// Map an EPSG code to a zone.
    ///
    /// Accepts WGS84 / UTM (326xx, 327xx) and ETRS89 / UTM (258xx).
    pub fn from_epsg(code: u32) -> Option<Self> {
        let (base, hemisphere) = match code {
            32601..=32660 => (32600, Hemisphere::North),
            32701..=32760 => (32700, Hemisphere::South),
            25801..=25860 => (25800, Hemisphere::North),
            _ => return None,
        };
        Some(Self {
            number: (code - base) as u8,
            hemisphere,
        })
    }

    /// EPSG code of the WGS84 / UTM system for this zone.
    pub fn epsg(&self) -> u32 {
        let base = match self.hemisphere {
            Hemisphere::North => 32600,
            Hemisphere::South => 32700,
        };
        base + self.number as u32
    }

    /// Longitude of the zone's central meridian, in degrees.
    pub fn central_meridian(&self) -> f64 {
        -183.0 + 6.0 * self.number as f64
    }

    /// PROJ definition string for this zone.
    pub fn proj_string(&self) -> String {
        match self.hemisphere {
            Hemisphere::North => format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs", self.number),
            Hemisphere::South => {
                format!("+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs", self.number)
            }
        }
    }
}

impl fmt::Display for UtmZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = match self.hemisphere {
            Hemisphere::North => 'N',
            Hemisphere::South => 'S',
        };
        write!(f, "{}{}", self.number, h)
    }
}

impl FromStr for UtmZone {
    type Err = MosaicError;

    /// Parse `32`, `32N`, `33s`, `EPSG:32632`, `32733` or `25832`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || MosaicError::InvalidZone(s.to_string());
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        let body = upper.strip_prefix("EPSG:").unwrap_or(&upper);

        let zone = if body.len() == 5 && body.chars().all(|c| c.is_ascii_digit()) {
            let code: u32 = body.parse().map_err(|_| invalid())?;
            UtmZone::from_epsg(code).ok_or_else(invalid)?
        } else {
            let (digits, hemisphere) = match body.chars().last() {
                Some('N') => (&body[..body.len() - 1], Hemisphere::North),
                Some('S') => (&body[..body.len() - 1], Hemisphere::South),
                _ => (body, Hemisphere::North),
            };
            let number: u8 = digits.trim().parse().map_err(|_| invalid())?;
            UtmZone { number, hemisphere }
        };

        if !zone.is_registered() {
            return Err(invalid());
        }
        Ok(zone)
    }
}

/// Inverse UTM projection for one zone, from easting/northing to lon/lat degrees.
pub struct UtmProjection {
    zone: UtmZone,
    utm: Proj,
    lonlat: Proj,
}

impl fmt::Debug for UtmProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtmProjection")
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

impl UtmProjection {
    /// Build the projection for a zone.
    ///
    /// Fails with [`MosaicError::InvalidZone`] if the zone is not registered.
    pub fn for_zone(zone: UtmZone) -> Result<Self> {
        if !zone.is_registered() {
            return Err(MosaicError::InvalidZone(zone.to_string()));
        }
        let utm = Proj::from_proj_string(&zone.proj_string())
            .map_err(|e| MosaicError::Projection(format!("invalid projection for zone {}: {:?}", zone, e)))?;
        let lonlat = Proj::from_proj_string(WGS84_LONLAT)
            .map_err(|e| MosaicError::Projection(format!("invalid WGS84 definition: {:?}", e)))?;
        Ok(Self { zone, utm, lonlat })
    }

    /// The zone this projection serves.
    pub fn zone(&self) -> UtmZone {
        self.zone
    }

    /// Convert easting/northing (meters) to (longitude, latitude) in degrees.
    pub fn to_lon_lat(&self, easting: f64, northing: f64) -> Result<(f64, f64)> {
        let mut point = (easting, northing, 0.0);
        transform(&self.utm, &self.lonlat, &mut point).map_err(|e| {
            MosaicError::Projection(format!(
                "cannot project ({}, {}) in zone {}: {:?}",
                easting, northing, self.zone, e
            ))
        })?;
        // Geographic output is in radians
        Ok((point.0.to_degrees(), point.1.to_degrees()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parse_zone_forms() {
        assert_eq!("32".parse::<UtmZone>().unwrap(), UtmZone::north(32));
        assert_eq!("32N".parse::<UtmZone>().unwrap(), UtmZone::north(32));
        assert_eq!("33s".parse::<UtmZone>().unwrap(), UtmZone::south(33));
        assert_eq!("EPSG:32632".parse::<UtmZone>().unwrap(), UtmZone::north(32));
        assert_eq!("32733".parse::<UtmZone>().unwrap(), UtmZone::south(33));
        assert_eq!("25832".parse::<UtmZone>().unwrap(), UtmZone::north(32));
    }

    #[test]
    fn test_parse_invalid_zone() {
        for bad in ["0", "61", "61N", "abc", "", "EPSG:4326", "32X"] {
            let err = bad.parse::<UtmZone>().unwrap_err();
            assert!(matches!(err, MosaicError::InvalidZone(_)), "{bad:?} parsed");
        }
    }

    #[test]
    fn test_epsg_roundtrip() {
        let zone = UtmZone::south(56);
        assert_eq!(zone.epsg(), 32756);
        assert_eq!(UtmZone::from_epsg(zone.epsg()), Some(zone));
        assert_eq!(UtmZone::from_epsg(4326), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(UtmZone::north(32).to_string(), "32N");
        assert_eq!(UtmZone::south(7).to_string(), "7S");
    }

    #[test]
    fn test_unregistered_zone_has_no_projection() {
        let err = UtmProjection::for_zone(UtmZone::north(0)).unwrap_err();
        assert!(matches!(err, MosaicError::InvalidZone(_)));
    }

    #[test]
    fn test_central_meridian_on_equator() {
        // False easting 500 km lies on the central meridian: zone 32 -> 9°E
        let proj = UtmProjection::for_zone(UtmZone::north(32)).unwrap();
        let (lon, lat) = proj.to_lon_lat(500_000.0, 0.0).unwrap();
        assert_abs_diff_eq!(lon, 9.0, epsilon = 1e-6);
        assert_abs_diff_eq!(lat, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_central_meridian_of_edge_zones() {
        assert_eq!(UtmZone::north(1).central_meridian(), -177.0);
        assert_eq!(UtmZone::south(31).central_meridian(), 3.0);
        assert_eq!(UtmZone::north(60).central_meridian(), 177.0);
    }

    #[test]
    fn test_southern_false_northing() {
        // Southern zones put the equator at 10,000 km northing
        let proj = UtmProjection::for_zone(UtmZone::south(33)).unwrap();
        let (lon, lat) = proj.to_lon_lat(500_000.0, 10_000_000.0).unwrap();
        assert_abs_diff_eq!(lon, 15.0, epsilon = 1e-6);
        assert_abs_diff_eq!(lat, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_known_point() {
        // Upper-left corner of the set1 region (T32UNA)
        let proj = UtmProjection::for_zone(UtmZone::north(32)).unwrap();
        let (lon, lat) = proj.to_lon_lat(605_020.0, 5_546_440.0).unwrap();
        assert!((9.0..11.0).contains(&lon), "lon {lon}");
        assert!((49.0..51.0).contains(&lat), "lat {lat}");
    }
}
