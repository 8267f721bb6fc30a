use crate::extract::error::ExtractError;
use crate::types::site::LatLon;
use chrono::NaiveDateTime;
use polars::prelude::{Column, DataFrame, DataType, TimeUnit};

pub const DATETIME_COLUMN: &str = "datetime";

/// Extracted values for one site: one row per requested timestamp,
/// one column per variable. Invalid timestamps and uncovered rows are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteSeries {
    pub site: LatLon,
    /// Distance from the site to the grid cell the values come from.
    pub cell_distance_km: Option<f64>,
    pub times: Vec<Option<NaiveDateTime>>,
    pub columns: Vec<(String, Vec<f64>)>,
}

impl SiteSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// A `datetime` column (milliseconds, null for invalid timestamps) followed by
    /// one `f64` column per variable.
    pub fn to_dataframe(&self) -> Result<DataFrame, ExtractError> {
        let millis: Vec<Option<i64>> = self
            .times
            .iter()
            .map(|t| t.map(|t| t.and_utc().timestamp_millis()))
            .collect();
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(
            Column::new(DATETIME_COLUMN.into(), millis)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        );
        for (name, values) in &self.columns {
            columns.push(Column::new(name.as_str().into(), values));
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// Dense `[time × site]` values, only valid when every site shares one timestamp series.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedMatrix {
    pub sites: Vec<LatLon>,
    pub times: Vec<Option<NaiveDateTime>>,
    /// Per variable, row-major `[time][site]`.
    pub variables: Vec<(String, Vec<f64>)>,
}

impl ExtractedMatrix {
    pub fn get(&self, variable: &str, time_index: usize, site_index: usize) -> Option<f64> {
        let (_, values) = self.variables.iter().find(|(n, _)| n == variable)?;
        if site_index >= self.sites.len() {
            return None;
        }
        values.get(time_index * self.sites.len() + site_index).copied()
    }

    /// The column of one site for `variable`.
    pub fn site_values(&self, variable: &str, site_index: usize) -> Option<Vec<f64>> {
        (0..self.times.len())
            .map(|t| self.get(variable, t, site_index))
            .collect()
    }
}
