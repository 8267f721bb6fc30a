//! Geographic request region.

use crate::resolver::error::ResolveError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A rectangular region of interest in geographic degrees.
///
/// The bottom-left corner is `(lat_min, lon_min)` and the top-right corner is
/// `(lat_max, lon_max)`. Latitudes must lie in `[-90, 90]` and longitudes in
/// `[-180, 180]`.
///
/// # Examples
///
/// ```
/// use merra2_clearsky::BoundingBox;
///
/// let tropics = BoundingBox::new(-11.0, -22.0, 11.0, 22.0).unwrap();
/// assert_eq!(tropics.lat_min(), -11.0);
///
/// // Corners in the wrong order are rejected before any network activity.
/// assert!(BoundingBox::new(11.0, -22.0, -11.0, 22.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    lat_min: f64,
    lon_min: f64,
    lat_max: f64,
    lon_max: f64,
}

impl BoundingBox {
    /// Creates a bounding box, failing with [`ResolveError::InvalidRegion`] when the
    /// corners are inverted, non-finite or outside the valid coordinate range.
    pub fn new(lat_min: f64, lon_min: f64, lat_max: f64, lon_max: f64) -> Result<Self, ResolveError> {
        let invalid = |reason: &str| ResolveError::InvalidRegion {
            lat_min,
            lon_min,
            lat_max,
            lon_max,
            reason: reason.to_string(),
        };

        if ![lat_min, lon_min, lat_max, lon_max].iter().all(|v| v.is_finite()) {
            return Err(invalid("coordinates must be finite"));
        }
        if lat_min > lat_max {
            return Err(invalid("lat_min is greater than lat_max"));
        }
        if lon_min > lon_max {
            return Err(invalid("lon_min is greater than lon_max"));
        }
        if !(-90.0..=90.0).contains(&lat_min) || !(-90.0..=90.0).contains(&lat_max) {
            return Err(invalid("latitude outside [-90, 90]"));
        }
        if !(-180.0..=180.0).contains(&lon_min) || !(-180.0..=180.0).contains(&lon_max) {
            return Err(invalid("longitude outside [-180, 180]"));
        }

        Ok(Self {
            lat_min,
            lon_min,
            lat_max,
            lon_max,
        })
    }

    /// The whole globe.
    pub fn global() -> Self {
        Self {
            lat_min: -90.0,
            lon_min: -180.0,
            lat_max: 90.0,
            lon_max: 180.0,
        }
    }

    pub fn lat_min(&self) -> f64 {
        self.lat_min
    }

    pub fn lon_min(&self) -> f64 {
        self.lon_min
    }

    pub fn lat_max(&self) -> f64 {
        self.lat_max
    }

    pub fn lon_max(&self) -> f64 {
        self.lon_max
    }
}

/// Formats as `lat{min}_{max}_lon{min}_{max}`, the fragment used in request directory names.
impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lat{}_{}_lon{}_{}",
            self.lat_min, self.lat_max, self.lon_min, self.lon_max
        )
    }
}
