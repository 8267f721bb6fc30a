use serde::{Deserialize, Serialize};

/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
///
/// # Examples
///
/// ```
/// use merra2_clearsky::LatLon;
///
/// let golden = LatLon(39.742, -105.18);
/// assert_eq!(golden.0, 39.742);
/// assert_eq!(golden.1, -105.18);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon(pub f64, pub f64);

/// A ground site for which atmospheric series are extracted.
///
/// `elevation` is in metres above sea level and only matters for the
/// scale-height correction applied in the clear-sky extraction path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
}

impl Site {
    pub fn new(latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
        }
    }

    pub fn location(&self) -> LatLon {
        LatLon(self.latitude, self.longitude)
    }
}

impl From<LatLon> for Site {
    fn from(value: LatLon) -> Self {
        Site::new(value.0, value.1, 0.0)
    }
}
