use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Invalid region lat [{lat_min}, {lat_max}] lon [{lon_min}, {lon_max}]: {reason}")]
    InvalidRegion {
        lat_min: f64,
        lon_min: f64,
        lat_max: f64,
        lon_max: f64,
        reason: String,
    },

    #[error("Date range end {end} is before start {start}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },

    #[error("At least one collection must be requested")]
    EmptyCollectionList,

    #[error("Unknown collection '{0}'")]
    UnknownCollection(String),
}
