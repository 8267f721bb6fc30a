pub mod clearsky;
mod config;
pub mod dataset;
mod error;
pub mod extract;
pub mod fetch;
pub mod ledger;
pub mod merge;
mod merra2;
pub mod plan;
pub mod resolver;
mod types;
mod utils;

#[cfg(test)]
mod testing;

pub use config::*;
pub use error::Merra2Error;
pub use merra2::*;

pub use types::bounding_box::BoundingBox;
pub use types::collection::{Catalogue, Collection, VariableSpec};
pub use types::date_range::{DateRange, Month};
pub use types::merge_mode::{MergeGranularity, ParseMergeGranularityError};
pub use types::retry::RetryOutcome;
pub use types::site::{LatLon, Site};

pub use clearsky::models::{Bird, ClearSkyModel, Irradiance, Schulze, ThrelkeldJordan};
pub use extract::corrections::{AtmosphericSeries, AtmosphericState};
pub use extract::series::SiteSeries;
pub use fetch::transport::{Credentials, HttpTransport, Transport};
pub use plan::RequestPlan;
pub use utils::get_data_dir;
