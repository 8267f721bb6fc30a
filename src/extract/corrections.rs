//! Conversion of raw MERRA-2 fields into the inputs clear-sky models expect.

use crate::extract::engine::Extractor;
use crate::extract::error::ExtractError;
use crate::extract::series::SiteSeries;
use crate::types::site::{LatLon, Site};
use chrono::NaiveDateTime;
use std::path::PathBuf;

pub const AOD_550: &str = "TOTEXTTAU";
pub const SCATTERING_AOD: &str = "TOTSCATAU";
pub const ANGSTROM: &str = "TOTANGSTR";
pub const ALBEDO: &str = "ALBEDO";
pub const OZONE: &str = "TO3";
pub const WATER_VAPOUR: &str = "TQV";
pub const SURFACE_PRESSURE: &str = "PS";
pub const SURFACE_GEOPOTENTIAL: &str = "PHIS";

/// Time-varying fields the clear-sky path reads from consolidated files.
pub const CLEAR_SKY_VARIABLES: [&str; 7] = [
    AOD_550,
    SCATTERING_AOD,
    ANGSTROM,
    ALBEDO,
    OZONE,
    WATER_VAPOUR,
    SURFACE_PRESSURE,
];

pub const GRAVITY: f64 = 9.80665;
/// Metres.
pub const SCALE_HEIGHT: f64 = 2100.0;
/// atm-cm. MERRA-2 carries no NO2 column.
pub const DEFAULT_NITROGEN_DIOXIDE: f64 = 0.0002;

/// kg m-2 to cm of precipitable water.
const WATER_VAPOUR_SCALE: f64 = 0.1;
/// Dobson units to atm-cm.
const OZONE_SCALE: f64 = 0.001;
/// Pa to hPa.
const PRESSURE_SCALE: f64 = 0.01;

/// Atmospheric inputs for one site at one timestamp, in model units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtmosphericState {
    /// Aerosol optical depth at 550 nm, elevation corrected.
    pub aod_550: f64,
    pub scattering_aod: f64,
    pub angstrom_exponent: f64,
    pub albedo: f64,
    /// atm-cm.
    pub ozone: f64,
    /// cm, elevation corrected.
    pub water_vapour: f64,
    /// hPa.
    pub pressure: f64,
    /// atm-cm.
    pub nitrogen_dioxide: f64,
}

impl AtmosphericState {
    /// Ångström turbidity coefficient β, from the 550 nm depth and the exponent.
    pub fn angstrom_turbidity(&self) -> f64 {
        self.aod_550 * 0.55f64.powf(self.angstrom_exponent)
    }

    pub fn is_complete(&self) -> bool {
        [
            self.aod_550,
            self.angstrom_exponent,
            self.albedo,
            self.ozone,
            self.water_vapour,
            self.pressure,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Corrected atmospheric series for one site.
#[derive(Debug, Clone, PartialEq)]
pub struct AtmosphericSeries {
    pub site: Site,
    /// Surface height of the grid cell, metres.
    pub grid_elevation: f64,
    pub times: Vec<Option<NaiveDateTime>>,
    pub states: Vec<AtmosphericState>,
}

/// Factor applied to column amounts when the site and its grid cell differ in height.
/// 1 when they match, below 1 when the site lies above the cell.
///
/// Column amounts fall off roughly as `exp(-z / H)` with height `z`, so the
/// column above a site at `site_elevation` is the cell's column scaled by
/// `exp((grid_elevation - site_elevation) / H)`. Written as a site-minus-grid
/// exponent this is `exp(-(site_elevation - grid_elevation) / H)`.
pub fn scale_height_factor(site_elevation: f64, grid_elevation: f64) -> f64 {
    ((grid_elevation - site_elevation) / SCALE_HEIGHT).exp()
}

pub fn geopotential_to_elevation(phis: f64) -> f64 {
    phis / GRAVITY
}

/// Applies unit conversions and the elevation correction to a raw series
/// holding every [`CLEAR_SKY_VARIABLES`] column.
pub fn correct(raw: &SiteSeries, site: Site, phis: f64) -> Result<AtmosphericSeries, ExtractError> {
    let column = |name: &str| {
        raw.column(name).ok_or_else(|| ExtractError::MissingVariable {
            path: PathBuf::new(),
            variable: name.to_string(),
        })
    };
    let aod = column(AOD_550)?;
    let scattering = column(SCATTERING_AOD)?;
    let angstrom = column(ANGSTROM)?;
    let albedo = column(ALBEDO)?;
    let ozone = column(OZONE)?;
    let water = column(WATER_VAPOUR)?;
    let pressure = column(SURFACE_PRESSURE)?;

    let grid_elevation = geopotential_to_elevation(phis);
    let factor = scale_height_factor(site.elevation, grid_elevation);

    let states = (0..raw.len())
        .map(|i| AtmosphericState {
            aod_550: aod[i] * factor,
            scattering_aod: scattering[i],
            angstrom_exponent: if angstrom[i] < 0.0 { 0.0 } else { angstrom[i] },
            albedo: albedo[i],
            ozone: ozone[i] * OZONE_SCALE,
            water_vapour: water[i] * WATER_VAPOUR_SCALE * factor,
            pressure: pressure[i] * PRESSURE_SCALE,
            nitrogen_dioxide: DEFAULT_NITROGEN_DIOXIDE,
        })
        .collect();

    Ok(AtmosphericSeries {
        site,
        grid_elevation,
        times: raw.times.clone(),
        states,
    })
}

/// Extracts and corrects the clear-sky inputs for every site over shared timestamps.
///
/// `datasets` are the time-varying consolidated files, `constants` the
/// invariant file holding `PHIS`.
pub fn atmospheric_series(
    datasets: &Extractor,
    constants: &Extractor,
    sites: &[Site],
    times: &[Option<NaiveDateTime>],
) -> Result<Vec<AtmosphericSeries>, ExtractError> {
    let locations: Vec<LatLon> = sites.iter().map(Site::location).collect();
    let raw = datasets.extract_sites(&locations, &CLEAR_SKY_VARIABLES, &[times.to_vec()])?;
    let phis = constants.extract_nearest(&locations, &[SURFACE_GEOPOTENTIAL], None)?;

    raw.iter()
        .zip(&phis)
        .zip(sites)
        .map(|((raw, phis), site)| {
            let phis = phis
                .column(SURFACE_GEOPOTENTIAL)
                .and_then(|c| c.first().copied())
                .unwrap_or(f64::NAN);
            correct(raw, *site, phis)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::datetime;

    fn raw(values: [f64; 7]) -> SiteSeries {
        SiteSeries {
            site: LatLon(0.0, 0.0),
            cell_distance_km: Some(0.0),
            times: vec![Some(datetime(2015, 11, 1, 0, 30))],
            columns: CLEAR_SKY_VARIABLES
                .iter()
                .zip(values)
                .map(|(n, v)| (n.to_string(), vec![v]))
                .collect(),
        }
    }

    #[test]
    fn scale_height_is_neutral_at_equal_elevation() {
        assert_eq!(scale_height_factor(350.0, 350.0), 1.0);
        assert!(scale_height_factor(1500.0, 300.0) < 1.0);
        assert!(scale_height_factor(0.0, 300.0) > 1.0);
    }

    #[test]
    fn scale_height_follows_site_minus_grid_exponent() {
        let factor = scale_height_factor(SCALE_HEIGHT, 0.0);
        assert!((factor - (-1.0f64).exp()).abs() < 1e-12);
        let up = scale_height_factor(800.0, 200.0);
        let down = scale_height_factor(200.0, 800.0);
        assert!((up * down - 1.0).abs() < 1e-12);
    }

    #[test]
    fn converts_units_and_clamps_angstrom() {
        let phis = 100.0 * GRAVITY;
        let site = Site::new(0.0, 0.0, 100.0);
        let corrected = correct(&raw([0.2, 0.15, -0.3, 0.18, 280.0, 25.0, 101_325.0]), site, phis).unwrap();
        assert!((corrected.grid_elevation - 100.0).abs() < 1e-9);

        let state = corrected.states[0];
        assert!((state.aod_550 - 0.2).abs() < 1e-12);
        assert_eq!(state.scattering_aod, 0.15);
        assert_eq!(state.angstrom_exponent, 0.0);
        assert!((state.ozone - 0.28).abs() < 1e-12);
        assert!((state.water_vapour - 2.5).abs() < 1e-12);
        assert!((state.pressure - 1013.25).abs() < 1e-9);
        assert_eq!(state.nitrogen_dioxide, DEFAULT_NITROGEN_DIOXIDE);
        assert!(state.is_complete());
        assert!((state.angstrom_turbidity() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn higher_site_sees_less_column() {
        let phis = 0.0;
        let low = correct(&raw([0.2, 0.1, 1.0, 0.2, 300.0, 20.0, 100_000.0]), Site::new(0.0, 0.0, 0.0), phis).unwrap();
        let high = correct(&raw([0.2, 0.1, 1.0, 0.2, 300.0, 20.0, 100_000.0]), Site::new(0.0, 0.0, 2100.0), phis).unwrap();
        assert!(high.states[0].water_vapour < low.states[0].water_vapour);
        assert!((high.states[0].aod_550 - 0.2 / std::f64::consts::E).abs() < 1e-12);
    }

    #[test]
    fn missing_column_is_reported() {
        let mut series = raw([0.0; 7]);
        series.columns.retain(|(n, _)| n != OZONE);
        assert!(matches!(
            correct(&series, Site::new(0.0, 0.0, 0.0), 0.0),
            Err(ExtractError::MissingVariable { variable, .. }) if variable == OZONE
        ));
    }
}
