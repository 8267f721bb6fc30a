//! Reading and writing the `(time, lat, lon)` NetCDF files the pipeline produces and consumes.

pub mod error;
pub mod grid;
pub mod time;
pub mod writer;
