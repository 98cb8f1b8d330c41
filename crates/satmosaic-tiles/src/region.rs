//! Built-in regions that can be requested by name.

use crate::coord::BoundingBox;
use crate::zone::UtmZone;
use crate::Result;
use std::fmt;
use std::str::FromStr;

/// A predefined UTM region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedRegion {
    /// Sentinel-2 tile T32UNA area.
    Set1,
    /// Area in zone 33N.
    Set2,
}

impl NamedRegion {
    /// All built-in regions.
    pub const ALL: [NamedRegion; 2] = [NamedRegion::Set1, NamedRegion::Set2];

    /// Name used on the command line and in output file names.
    pub const fn name(&self) -> &'static str {
        match self {
            NamedRegion::Set1 => "set1",
            NamedRegion::Set2 => "set2",
        }
    }

    /// Zone the corners are expressed in.
    pub const fn default_zone(&self) -> UtmZone {
        match self {
            NamedRegion::Set1 => UtmZone::north(32),
            NamedRegion::Set2 => UtmZone::north(33),
        }
    }

    /// Upper-left and lower-right corners as (easting, northing).
    pub const fn corners(&self) -> ((f64, f64), (f64, f64)) {
        match self {
            NamedRegion::Set1 => ((605_020.0, 5_546_440.0), (609_240.0, 5_542_220.0)),
            NamedRegion::Set2 => ((443_040.0, 5_834_800.0), (447_220.0, 5_830_600.0)),
        }
    }

    /// Bounding box of the region, optionally reinterpreted in another zone.
    pub fn bounding_box(&self, zone_override: Option<UtmZone>) -> Result<BoundingBox> {
        let (upper_left, lower_right) = self.corners();
        BoundingBox::from_corners(zone_override.unwrap_or(self.default_zone()), upper_left, lower_right)
    }
}

impl fmt::Display for NamedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NamedRegion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        NamedRegion::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown dataset '{}' (expected set1 or set2)", s))
    }
}
