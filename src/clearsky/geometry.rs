//! Calendar and solar-position helpers shared by the clear-sky models.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::f64::consts::PI;

/// Solar constant used by [`extraterrestrial_irradiance`], W m-2.
pub const SOLAR_CONSTANT: f64 = 1366.1;

/// A day's position in its year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayOfYear {
    /// 1-based.
    pub day: u32,
    pub days_in_year: u32,
}

impl DayOfYear {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            day: date.ordinal(),
            days_in_year: days_in_year(date.year()),
        }
    }
}

pub fn days_in_year(year: i32) -> u32 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366
    } else {
        365
    }
}

/// Spencer's Fourier series for the sun–earth distance correction, scaled by `solar_constant`.
pub fn extraterrestrial_irradiance(day: DayOfYear, solar_constant: f64) -> f64 {
    let b = 2.0 * PI * (day.day as f64 - 1.0) / day.days_in_year as f64;
    solar_constant
        * (1.00011 + 0.034221 * b.cos() + 0.00128 * b.sin() + 0.000719 * (2.0 * b).cos()
            + 0.000077 * (2.0 * b).sin())
}

/// Solar zenith angle in radians for a UTC timestamp, using the equation of
/// time and Spencer's declination series.
pub fn solar_zenith(latitude: f64, longitude: f64, time: NaiveDateTime) -> f64 {
    let day = time.ordinal() as f64;
    let hour = time.hour() as f64 + time.minute() as f64 / 60.0 + time.second() as f64 / 3600.0;

    let b = (360.0 / 365.242 * (day - 1.0)).to_radians();
    let equation_of_time = 0.258 * b.cos() - 7.416 * b.sin() - 3.648 * (2.0 * b).cos() - 9.228 * (2.0 * b).sin();
    let solar_noon = 12.0 - longitude / 15.0 - equation_of_time / 60.0;

    let mut hour_angle = (hour - solar_noon) * 15.0;
    if hour_angle >= 180.0 {
        hour_angle -= 360.0;
    } else if hour_angle <= -180.0 {
        hour_angle += 360.0;
    }

    let g = 2.0 * PI / 365.0 * (day + hour / 24.0 - 1.0);
    let declination = 0.006918 - 0.399912 * g.cos() + 0.070257 * g.sin() - 0.006758 * (2.0 * g).cos()
        + 0.000907 * (2.0 * g).sin()
        - 0.002697 * (3.0 * g).cos()
        + 0.001480 * (3.0 * g).sin();

    let lat = latitude.to_radians();
    let cos_zenith = lat.sin() * declination.sin() + lat.cos() * declination.cos() * hour_angle.to_radians().cos();
    cos_zenith.clamp(-1.0, 1.0).acos()
}
