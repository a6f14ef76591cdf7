//! Module containing physical constants and unit conversions.

use crate::imports::*;

/// Unit conversions that should NEVER change
pub const KMH_PER_MPS: f64 = 3.6;
pub const M_PER_KM: f64 = 1_000.0;
pub const S_PER_H: f64 = 3_600.0;

/// Struct containing ambient physical properties used by the road load model
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PhysicalProperties {
    pub air_density_kg_per_m3: f64, // = 1.225, sea level air density at approximately 15C
    pub a_grav_mps2: f64,           // = 9.81
}

impl Default for PhysicalProperties {
    fn default() -> Self {
        Self {
            air_density_kg_per_m3: 1.225,
            a_grav_mps2: 9.81,
        }
    }
}

impl SerdeAPI for PhysicalProperties {}

/// Converts speed in km/h to m/s
pub fn kmh_to_mps(speed_kmh: f64) -> f64 {
    speed_kmh / KMH_PER_MPS
}

/// Converts speed in m/s to km/h
pub fn mps_to_kmh(speed_mps: f64) -> f64 {
    speed_mps * KMH_PER_MPS
}

/// Energy in Wh delivered by `pwr_watts` sustained over `dt_s` seconds
pub fn energy_wh(pwr_watts: f64, dt_s: f64) -> f64 {
    pwr_watts * dt_s / S_PER_H
}

#[cfg(test)]
mod params_test {
    use super::*;

    #[test]
    fn test_speed_conversions() {
        assert!(almost_eq(kmh_to_mps(95.0), 26.388888888888889, None));
        assert!(almost_eq(mps_to_kmh(kmh_to_mps(42.0)), 42.0, None));
    }

    #[test]
    fn test_energy_wh() {
        assert_eq!(energy_wh(1_000.0, 3_600.0), 1_000.0);
        assert_eq!(energy_wh(0.0, 50.0), 0.0);
    }
}
