use crate::clearsky::geometry::{extraterrestrial_irradiance, DayOfYear};
use crate::extract::corrections::AtmosphericState;
use std::f64::consts::PI;

/// Broadband clear-sky irradiance components, W m-2.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Irradiance {
    /// Direct normal.
    pub dni: f64,
    /// Diffuse horizontal.
    pub dhi: f64,
    /// Global horizontal.
    pub ghi: f64,
}

impl Irradiance {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Negative components become zero. NaN stays NaN.
    pub fn clamped(self) -> Self {
        let floor = |v: f64| if v < 0.0 { 0.0 } else { v };
        Self {
            dni: floor(self.dni),
            dhi: floor(self.dhi),
            ghi: floor(self.ghi),
        }
    }
}

/// A clear-sky irradiance model.
///
/// `zenith` is the solar zenith angle in radians. With the sun at or below
/// the horizon every model returns [`Irradiance::zero`].
pub trait ClearSkyModel {
    fn name(&self) -> &'static str;

    fn irradiance(&self, state: &AtmosphericState, zenith: f64, day: DayOfYear) -> Irradiance;
}

fn sun_is_up(zenith: f64) -> bool {
    zenith.cos() > 0.0
}

/// Threlkeld & Jordan (1957). Depends on geometry and season only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrelkeldJordan;

impl ClearSkyModel for ThrelkeldJordan {
    fn name(&self) -> &'static str {
        "TJ"
    }

    fn irradiance(&self, _state: &AtmosphericState, zenith: f64, day: DayOfYear) -> Irradiance {
        if !sun_is_up(zenith) {
            return Irradiance::zero();
        }
        let n = day.day as f64;
        let air_mass = 1.0 / zenith.cos();
        let a = 1160.0 + 75.0 * (2.0 * PI * (n - 275.0) / 365.0).sin();
        let k = 0.174 + 0.035 * (2.0 * PI * (n - 100.0) / 365.0).sin();
        let c = 0.095 + 0.04 * (2.0 * PI * (n - 100.0) / 365.0).sin();

        let dni = a * (-k * air_mass).exp();
        let dhi = c * dni;
        Irradiance {
            dni,
            dhi,
            ghi: dni * zenith.cos() + dhi,
        }
        .clamped()
    }
}

/// Schulze (1976). Depends on geometry only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Schulze;

impl ClearSkyModel for Schulze {
    fn name(&self) -> &'static str {
        "Schulze"
    }

    fn irradiance(&self, _state: &AtmosphericState, zenith: f64, _day: DayOfYear) -> Irradiance {
        if !sun_is_up(zenith) {
            return Irradiance::zero();
        }
        let cos_z = zenith.cos();
        let dni = 1127.0 * 0.888f64.powf(1.0 / cos_z);
        let dhi = 94.23 * cos_z.sqrt();
        Irradiance {
            dni,
            dhi,
            ghi: dni * cos_z + dhi,
        }
        .clamped()
    }
}

/// Bird & Hulstrom (1981) with the transmittances driven by the atmospheric state.
#[derive(Debug, Clone, Copy)]
pub struct Bird {
    pub solar_constant: f64,
    /// Fraction of aerosol extinction that is absorption.
    pub aerosol_absorption: f64,
    /// Forward scattering ratio of aerosols.
    pub forward_scattering: f64,
}

impl Default for Bird {
    fn default() -> Self {
        Self {
            solar_constant: 1353.0,
            aerosol_absorption: 0.1,
            forward_scattering: 0.84,
        }
    }
}

impl ClearSkyModel for Bird {
    fn name(&self) -> &'static str {
        "Bird"
    }

    fn irradiance(&self, state: &AtmosphericState, zenith: f64, day: DayOfYear) -> Irradiance {
        if !sun_is_up(zenith) {
            return Irradiance::zero();
        }
        let cos_z = zenith.cos();
        let e_ext = extraterrestrial_irradiance(day, self.solar_constant);

        let zenith_deg = zenith.to_degrees();
        let air_mass = 1.0 / (cos_z + 0.15 * (90.0 - zenith_deg + 3.885).powf(-1.25));
        let pressure_air_mass = air_mass * state.pressure / 1013.25;

        let rayleigh = (-0.0903
            * pressure_air_mass.powf(0.84)
            * (1.0 + pressure_air_mass - pressure_air_mass.powf(1.01)))
        .exp();

        let ozone_path = state.ozone * air_mass;
        let ozone = 1.0
            - 0.1611 * ozone_path * (1.0 + 139.48 * ozone_path).powf(-0.3035)
            - 0.002715 * ozone_path / (1.0 + 0.044 * ozone_path + 0.0003 * ozone_path * ozone_path);

        let mixed_gases = (-0.0127 * pressure_air_mass.powf(0.26)).exp();

        let water_path = state.water_vapour * air_mass;
        let water = 1.0 - 2.4959 * water_path / ((1.0 + 79.034 * water_path).powf(0.6828) + 6.385 * water_path);

        let alpha = state.angstrom_exponent;
        let beta = state.angstrom_turbidity();
        let broadband_aod = beta * (0.2758 * 0.38f64.powf(-alpha) + 0.35 * 0.5f64.powf(-alpha));
        let aerosol = (-broadband_aod.powf(0.873)
            * (1.0 + broadband_aod - broadband_aod.powf(0.7088))
            * air_mass.powf(0.9108))
        .exp();

        let dni = e_ext * 0.9662 * aerosol * water * mixed_gases * ozone * rayleigh;

        let aerosol_absorbed =
            1.0 - self.aerosol_absorption * (1.0 - air_mass + air_mass.powf(1.06)) * (1.0 - aerosol);
        let aerosol_scattered = aerosol / aerosol_absorbed;
        let ba = self.forward_scattering;
        let scattered = e_ext * cos_z * 0.79 * ozone * mixed_gases * water * aerosol_absorbed
            * (0.5 * (1.0 - rayleigh) + ba * (1.0 - aerosol_scattered))
            / (1.0 - air_mass + air_mass.powf(1.02));

        let sky_albedo = (0.0685 + (1.0 - ba) * (1.0 - aerosol_scattered)).clamp(0.0, 1.0);
        let ghi = (dni * cos_z + scattered) / (1.0 - state.albedo * sky_albedo);
        Irradiance {
            dni,
            dhi: ghi - dni * cos_z,
            ghi,
        }
        .clamped()
    }
}
