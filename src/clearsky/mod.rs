//! Clear-sky irradiance models evaluated on extracted atmospheric series.

pub mod geometry;
pub mod models;

use crate::clearsky::geometry::{solar_zenith, DayOfYear};
use crate::clearsky::models::{ClearSkyModel, Irradiance};
use crate::extract::corrections::AtmosphericSeries;

/// Runs `model` over every timestamp of `series`. Invalid timestamps and
/// incomplete states give NaN components.
pub fn evaluate<M: ClearSkyModel + ?Sized>(model: &M, series: &AtmosphericSeries) -> Vec<Irradiance> {
    series
        .times
        .iter()
        .zip(&series.states)
        .map(|(time, state)| match time {
            Some(time) if state.is_complete() => {
                let zenith = solar_zenith(series.site.latitude, series.site.longitude, *time);
                model.irradiance(state, zenith, DayOfYear::of(time.date()))
            }
            _ => Irradiance {
                dni: f64::NAN,
                dhi: f64::NAN,
                ghi: f64::NAN,
            },
        })
        .collect()
}
