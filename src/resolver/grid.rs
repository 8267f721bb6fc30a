use crate::types::bounding_box::BoundingBox;

/// A regular latitude/longitude grid addressed by integer indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    lat_origin: f64,
    lat_step: f64,
    lat_max_index: usize,
    lon_origin: f64,
    lon_step: f64,
    lon_max_index: usize,
}

/// Inclusive index ranges into a [`GridSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridWindow {
    pub lat_start: usize,
    pub lat_end: usize,
    pub lon_start: usize,
    pub lon_end: usize,
}

impl GridWindow {
    pub fn lat_len(&self) -> usize {
        self.lat_end - self.lat_start + 1
    }

    pub fn lon_len(&self) -> usize {
        self.lon_end - self.lon_start + 1
    }
}

impl GridSpec {
    /// The MERRA-2 native grid: 0.5° latitude by 0.625° longitude,
    /// indices 0..=360 and 0..=575 as exposed by the OPeNDAP server.
    pub const fn merra2() -> Self {
        Self {
            lat_origin: -90.0,
            lat_step: 0.5,
            lat_max_index: 360,
            lon_origin: -180.0,
            lon_step: 0.625,
            lon_max_index: 575,
        }
    }

    pub fn lat_native(&self, latitude: f64) -> f64 {
        (latitude - self.lat_origin) / self.lat_step
    }

    pub fn lon_native(&self, longitude: f64) -> f64 {
        (longitude - self.lon_origin) / self.lon_step
    }

    pub fn latitude_of(&self, index: usize) -> f64 {
        self.lat_origin + index as f64 * self.lat_step
    }

    pub fn longitude_of(&self, index: usize) -> f64 {
        self.lon_origin + index as f64 * self.lon_step
    }

    pub fn snap_lat(&self, latitude: f64) -> usize {
        snap(self.lat_native(latitude), self.lat_max_index)
    }

    pub fn snap_lon(&self, longitude: f64) -> usize {
        snap(self.lon_native(longitude), self.lon_max_index)
    }

    /// Snaps the corners of `bbox` to the nearest grid indices.
    pub fn resolve(&self, bbox: &BoundingBox) -> GridWindow {
        GridWindow {
            lat_start: self.snap_lat(bbox.lat_min()),
            lat_end: self.snap_lat(bbox.lat_max()),
            lon_start: self.snap_lon(bbox.lon_min()),
            lon_end: self.snap_lon(bbox.lon_max()),
        }
    }
}

/// Nearest index in `0..=max_index`. Exactly halfway between two indices picks the lower one.
fn snap(native: f64, max_index: usize) -> usize {
    if native.is_nan() || native <= 0.0 {
        return 0;
    }
    let max = max_index as f64;
    if native >= max {
        return max_index;
    }
    let lower = native.floor();
    if native - lower > 0.5 {
        lower as usize + 1
    } else {
        lower as usize
    }
}
