//! Module containing the solar car struct and its road load power model.

use crate::imports::*;
use crate::params::*;

use validator::Validate;

/// Solar race car profile: chassis, drivetrain, photovoltaic array, and battery.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Validate)]
pub struct SolarCar {
    /// Vehicle name
    #[serde(default)]
    pub name: String,
    /// Total vehicle mass including driver, $kg$
    #[validate(range(min = 0))]
    pub mass_kg: f64,
    /// Aerodynamic drag coefficient
    #[validate(range(min = 0))]
    pub drag_coef: f64,
    /// Frontal area, $m^2$
    #[validate(range(min = 0))]
    pub frontal_area_m2: f64,
    /// Rolling resistance coefficient
    #[validate(range(min = 0))]
    pub wheel_rr_coef: f64,
    /// Motor-to-wheel efficiency
    #[validate(range(min = 1e-6, max = 1))]
    pub drivetrain_eff: f64,
    /// Photovoltaic array area, $m^2$
    #[validate(range(min = 0))]
    pub pv_area_m2: f64,
    /// Photovoltaic array efficiency
    #[validate(range(min = 0, max = 1))]
    pub pv_eff: f64,
    /// Usable battery energy, $Wh$
    #[validate(range(min = 1e-6))]
    pub ess_max_wh: f64,
    #[serde(default)]
    pub props: PhysicalProperties,
}

impl Default for SolarCar {
    fn default() -> Self {
        Self {
            name: String::from("Default Solar Car"),
            mass_kg: 330.0,
            drag_coef: 0.12,
            frontal_area_m2: 1.08,
            wheel_rr_coef: 0.0045,
            drivetrain_eff: 0.98,
            pv_area_m2: 6.0,
            pv_eff: 0.22,
            ess_max_wh: 3_000.0,
            props: PhysicalProperties::default(),
        }
    }
}

/// Tractive force components opposing motion, $N$
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RoadLoad {
    pub drag_n: f64,
    pub rolling_n: f64,
    /// negative on descents
    pub gravity_n: f64,
}

impl RoadLoad {
    pub fn total_n(&self) -> f64 {
        self.drag_n + self.rolling_n + self.gravity_n
    }
}

impl SolarCar {
    pub fn mock_vehicle() -> Self {
        Self::default()
    }

    /// Checks field ranges
    pub fn set_derived(&mut self) -> anyhow::Result<()> {
        match self.validate() {
            Ok(_) => (),
            Err(e) => bail!(e),
        };
        Ok(())
    }

    /// Lumped aerodynamic coefficient $\frac{1}{2} \rho C_d A$, $\frac{kg}{m}$
    pub fn drag_factor(&self) -> f64 {
        0.5 * self.props.air_density_kg_per_m3 * self.drag_coef * self.frontal_area_m2
    }

    /// Road load forces at steady `speed_mps` on a slope of `grade_perc` percent
    pub fn road_load(&self, speed_mps: f64, grade_perc: f64) -> RoadLoad {
        let grade_angle = (grade_perc / 100.0).atan();
        let weight_n = self.mass_kg * self.props.a_grav_mps2;
        RoadLoad {
            drag_n: self.drag_factor() * speed_mps.powi(2),
            rolling_n: self.wheel_rr_coef * weight_n * grade_angle.cos(),
            gravity_n: weight_n * grade_angle.sin(),
        }
    }

    /// Electrical power, $W$, needed to hold `speed_mps` on a slope of `grade_perc` percent.
    /// Zero at standstill or reverse speed, and never negative: no regeneration on descents.
    pub fn power_needed(&self, speed_mps: f64, grade_perc: f64) -> f64 {
        if speed_mps <= 0.0 {
            return 0.0;
        }
        let mech_watts = self.road_load(speed_mps, grade_perc).total_n() * speed_mps;
        (mech_watts / self.drivetrain_eff).max(0.0)
    }

    /// Derivative of [`power_needed`](SolarCar::power_needed) with respect to speed, $\frac{W s}{m}$.
    /// Zero wherever the power is floored at zero.
    pub fn power_needed_slope(&self, speed_mps: f64, grade_perc: f64) -> f64 {
        if self.power_needed(speed_mps, grade_perc) <= 0.0 {
            return 0.0;
        }
        let load = self.road_load(speed_mps, grade_perc);
        (3.0 * load.drag_n + load.rolling_n + load.gravity_n) / self.drivetrain_eff
    }

    /// Photovoltaic output, $W$, under `irradiance_w_per_m2`
    pub fn solar_power(&self, irradiance_w_per_m2: f64) -> f64 {
        irradiance_w_per_m2 * self.pv_area_m2 * self.pv_eff
    }
}

impl SerdeAPI for SolarCar {
    fn init(&mut self) -> anyhow::Result<()> {
        self.set_derived()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_power_at_or_below_standstill() {
        let veh = SolarCar::mock_vehicle();
        for grade in [-30.0, -5.0, 0.0, 5.0, 30.0] {
            assert_eq!(veh.power_needed(0.0, grade), 0.0);
            assert_eq!(veh.power_needed(-3.0, grade), 0.0);
            assert_eq!(veh.power_needed(-1e-12, grade), 0.0);
        }
    }

    #[test]
    fn test_power_monotonic_on_flat() {
        let veh = SolarCar::mock_vehicle();
        let mut prev = 0.0;
        for i in 1..=60 {
            let pwr = veh.power_needed(i as f64 * 0.5, 0.0);
            assert!(pwr > prev, "power must grow with speed: {pwr} <= {prev}");
            prev = pwr;
        }
    }

    #[test]
    fn test_power_flat_reference_value() {
        let veh = SolarCar::mock_vehicle();
        let speed = 20.0;
        let drag = 0.5 * 1.225 * 0.12 * 1.08 * speed * speed;
        let roll = 0.0045 * 330.0 * 9.81;
        let expected = (drag + roll) * speed / 0.98;
        assert!(almost_eq(veh.power_needed(speed, 0.0), expected, None));
    }

    #[test]
    fn test_descent_is_floored_at_zero() {
        let veh = SolarCar::mock_vehicle();
        assert_eq!(veh.power_needed(5.0, -10.0), 0.0);
        assert_eq!(veh.power_needed_slope(5.0, -10.0), 0.0);
        assert!(veh.power_needed(5.0, 10.0) > veh.power_needed(5.0, 0.0));
    }

    #[test]
    fn test_power_is_pure() {
        let veh = SolarCar::mock_vehicle();
        assert_eq!(veh.power_needed(17.3, 2.5), veh.power_needed(17.3, 2.5));
    }

    #[test]
    fn test_power_slope_matches_finite_difference() {
        let veh = SolarCar::mock_vehicle();
        let h = 1e-5;
        for (speed, grade) in [(5.0, 0.0), (20.0, 3.0), (26.0, -1.0), (12.0, 10.0)] {
            let fd = (veh.power_needed(speed + h, grade) - veh.power_needed(speed - h, grade))
                / (2.0 * h);
            assert!(
                almost_eq(veh.power_needed_slope(speed, grade), fd, Some(1e-5)),
                "speed {speed}, grade {grade}"
            );
        }
    }

    #[test]
    fn test_solar_power() {
        let veh = SolarCar::mock_vehicle();
        assert!(almost_eq(veh.solar_power(800.0), 800.0 * 6.0 * 0.22, None));
        assert_eq!(veh.solar_power(0.0), 0.0);
    }

    #[test]
    fn test_input_validation() {
        let mut veh = SolarCar::mock_vehicle();
        veh.mass_kg = -50.0; // bad input
        veh.drivetrain_eff = 1.5; // bad input
        veh.pv_eff = -0.1; // bad input
        let err = veh.set_derived().unwrap_err().to_string();
        for field in ["mass_kg", "drivetrain_eff", "pv_eff"] {
            assert!(err.contains(field), "{field} missing from {err}");
        }
        assert!(SolarCar::mock_vehicle().set_derived().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip_runs_validation() {
        let veh = SolarCar::mock_vehicle();
        let yaml = veh.to_yaml().unwrap();
        assert_eq!(SolarCar::from_yaml(&yaml).unwrap(), veh);
        let bad = yaml.replace("ess_max_wh: 3000.0", "ess_max_wh: -1.0");
        assert!(SolarCar::from_yaml(bad).is_err());
    }
}
