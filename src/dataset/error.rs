use chrono::NaiveDateTime;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to open NetCDF file '{0}'")]
    Open(PathBuf, #[source] netcdf::Error),

    #[error("Failed to create NetCDF file '{0}'")]
    Create(PathBuf, #[source] netcdf::Error),

    #[error("Failed to read '{variable}' from '{path}'")]
    Read {
        path: PathBuf,
        variable: String,
        #[source]
        source: netcdf::Error,
    },

    #[error("Failed to write '{item}' to '{path}'")]
    Write {
        path: PathBuf,
        item: String,
        #[source]
        source: netcdf::Error,
    },

    #[error("Variable '{variable}' not found in '{path}'")]
    MissingVariable { path: PathBuf, variable: String },

    #[error("Unsupported time units '{units}' in '{path}'")]
    InvalidTimeUnits { path: PathBuf, units: String },

    #[error("Time value {offset} in '{path}' is out of range")]
    TimeOutOfRange { path: PathBuf, offset: f64 },

    #[error("Grid of '{path}' does not match: {reason}")]
    GridMismatch { path: PathBuf, reason: String },

    #[error("Time coordinate of '{path}' is not strictly increasing at {at}")]
    NonMonotonicTime { path: PathBuf, at: NaiveDateTime },

    #[error("Variable '{variable}' in '{path}' has {found} values, expected {expected}")]
    ShapeMismatch {
        path: PathBuf,
        variable: String,
        expected: usize,
        found: usize,
    },
}
