//! Module containing race strategy parameters, operating mode selection, and the velocity
//! loss that the optimizer minimizes.

use crate::imports::*;
use crate::optimizer::AdamParams;
use crate::params::{kmh_to_mps, M_PER_KM};
use crate::vehicle::SolarCar;

/// Tunable strategy for choosing a velocity on each segment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RaceStrategy {
    /// Speed held during the final sprint and upper bound of the optimizer, $\frac{km}{h}$
    pub aggressive_target_speed_kmh: f64,
    /// Battery percentage at or below which the car switches to critical recovery
    pub critical_battery_perc: f64,
    /// Remaining distance at or below which the car sprints to the finish, $km$
    pub finish_line_km: f64,
    /// Lower bound on velocity, $\frac{m}{s}$
    pub min_speed_mps: f64,
    /// Optimizer seed speed in critical recovery, $\frac{km}{h}$
    pub recovery_speed_kmh: f64,
    /// Weight of the power deficit penalty relative to the speed reward
    pub deficit_weight: f64,
    /// Battery fraction below which deficits are penalized more heavily
    pub stress_battery_frac: f64,
    #[serde(default)]
    pub adam: AdamParams,
}

impl Default for RaceStrategy {
    fn default() -> Self {
        Self {
            aggressive_target_speed_kmh: 95.0,
            critical_battery_perc: 5.0,
            finish_line_km: 30.0,
            min_speed_mps: 0.1,
            recovery_speed_kmh: 10.0,
            deficit_weight: 0.0005,
            stress_battery_frac: 0.5,
            adam: AdamParams::default(),
        }
    }
}

impl RaceStrategy {
    /// Upper velocity bound, $\frac{m}{s}$
    pub fn max_speed_mps(&self) -> f64 {
        kmh_to_mps(self.aggressive_target_speed_kmh)
    }

    /// Velocity seed for the optimizer in `mode`, or the fixed velocity for modes that skip it
    pub fn seed_speed_mps(&self, mode: OperatingMode) -> f64 {
        match mode {
            OperatingMode::FinalSprint | OperatingMode::AdamOptimized => self.max_speed_mps(),
            OperatingMode::CriticalRecovery => kmh_to_mps(self.recovery_speed_kmh),
        }
    }
}

impl SerdeAPI for RaceStrategy {
    fn init(&mut self) -> anyhow::Result<()> {
        ensure!(self.min_speed_mps > 0.0, format_dbg!(self.min_speed_mps));
        ensure!(
            self.max_speed_mps() >= self.min_speed_mps,
            "aggressive target speed {} km/h is below minimum speed {} m/s",
            self.aggressive_target_speed_kmh,
            self.min_speed_mps
        );
        ensure!(self.deficit_weight >= 0.0, format_dbg!(self.deficit_weight));
        self.adam.init()
    }
}

/// Driving mode chosen for a single segment
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    /// Close to the finish: hold the aggressive target speed regardless of battery
    #[serde(rename = "Final Sprint")]
    FinalSprint,
    /// Battery nearly empty: optimize upward from a crawl
    #[serde(rename = "Critical Recovery")]
    CriticalRecovery,
    /// Optimize downward from the aggressive target speed
    #[serde(rename = "Adam-optimized")]
    AdamOptimized,
}

impl OperatingMode {
    pub const ALL: [OperatingMode; 3] = [
        OperatingMode::FinalSprint,
        OperatingMode::CriticalRecovery,
        OperatingMode::AdamOptimized,
    ];

    /// Picks the mode for a segment from the distance left before it and the battery fraction.
    /// Checked in priority order, so exactly one mode applies to any input.
    pub fn select(dist_to_finish_km: f64, battery_frac: f64, strategy: &RaceStrategy) -> Self {
        if dist_to_finish_km <= strategy.finish_line_km {
            Self::FinalSprint
        } else if battery_frac * 100.0 <= strategy.critical_battery_perc {
            Self::CriticalRecovery
        } else {
            Self::AdamOptimized
        }
    }

    /// Whether the velocity for this mode comes from the optimizer
    pub fn is_optimized(&self) -> bool {
        !matches!(self, Self::FinalSprint)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::FinalSprint => "Final Sprint",
            Self::CriticalRecovery => "Critical Recovery",
            Self::AdamOptimized => "Adam-optimized",
        }
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Scores a candidate velocity on one segment: rewards speed and penalizes drawing more power
/// than the panels supply, more so once the battery is below
/// [`stress_battery_frac`](RaceStrategy::stress_battery_frac).
#[derive(Debug, Clone, Copy)]
pub struct VelocityLoss<'a> {
    pub veh: &'a SolarCar,
    pub strategy: &'a RaceStrategy,
    pub grade_perc: f64,
    pub solar_pwr_watts: f64,
    pub battery_frac: f64,
}

impl<'a> VelocityLoss<'a> {
    pub fn new(
        veh: &'a SolarCar,
        strategy: &'a RaceStrategy,
        grade_perc: f64,
        solar_pwr_watts: f64,
        battery_frac: f64,
    ) -> Self {
        Self {
            veh,
            strategy,
            grade_perc,
            solar_pwr_watts,
            battery_frac,
        }
    }

    /// Penalty multiplier on the power deficit, 1 above the stress threshold
    pub fn stress_factor(&self) -> f64 {
        1.0 + (self.strategy.stress_battery_frac - self.battery_frac).max(0.0)
    }

    /// Power drawn from the battery at `speed_mps`, $W$
    pub fn deficit_watts(&self, speed_mps: f64) -> f64 {
        (self.veh.power_needed(speed_mps, self.grade_perc) - self.solar_pwr_watts).max(0.0)
    }

    /// Loss at any real `speed_mps`, including probes outside the physical range
    pub fn eval(&self, speed_mps: f64) -> f64 {
        let penalty = self.deficit_watts(speed_mps) * self.stress_factor();
        -speed_mps + self.strategy.deficit_weight * penalty
    }

    /// Closed-form derivative of [`eval`](VelocityLoss::eval) with respect to speed
    pub fn gradient(&self, speed_mps: f64) -> f64 {
        let dpenalty = if self.deficit_watts(speed_mps) > 0.0 {
            self.veh.power_needed_slope(speed_mps, self.grade_perc) * self.stress_factor()
        } else {
            0.0
        };
        -1.0 + self.strategy.deficit_weight * dpenalty
    }

    /// Central finite difference estimate of the derivative with step `step`
    pub fn gradient_fd(&self, speed_mps: f64, step: f64) -> f64 {
        (self.eval(speed_mps + step) - self.eval(speed_mps - step)) / (2.0 * step)
    }
}

/// Distance from the start of segment `i` to the finish, $km$
pub fn dist_to_finish_km(num_segments: usize, i: usize, segment_length_m: f64) -> f64 {
    num_segments.saturating_sub(i) as f64 * segment_length_m / M_PER_KM
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_priority() {
        let strategy = RaceStrategy::default();
        assert_eq!(
            OperatingMode::select(30.0, 0.0, &strategy),
            OperatingMode::FinalSprint
        );
        assert_eq!(
            OperatingMode::select(31.0, 0.05, &strategy),
            OperatingMode::CriticalRecovery
        );
        assert_eq!(
            OperatingMode::select(31.0, 0.051, &strategy),
            OperatingMode::AdamOptimized
        );
        assert_eq!(
            OperatingMode::select(315.0, 1.0, &strategy),
            OperatingMode::AdamOptimized
        );
    }

    #[test]
    fn test_mode_selection_is_exhaustive_and_exclusive() {
        let strategy = RaceStrategy::default();
        for dist in [0.0, 1.0, 29.0, 30.0, 30.5, 100.0, 1e6] {
            for frac in [0.0, 0.01, 0.05, 0.0500001, 0.2, 0.5, 1.0] {
                let mode = OperatingMode::select(dist, frac, &strategy);
                let sprint = dist <= strategy.finish_line_km;
                let critical = !sprint && frac * 100.0 <= strategy.critical_battery_perc;
                let optimized = !sprint && !critical;
                let matches = OperatingMode::ALL
                    .iter()
                    .filter(|m| {
                        (**m == OperatingMode::FinalSprint && sprint)
                            || (**m == OperatingMode::CriticalRecovery && critical)
                            || (**m == OperatingMode::AdamOptimized && optimized)
                    })
                    .collect::<Vec<_>>();
                assert_eq!(matches, vec![&mode], "dist {dist}, frac {frac}");
            }
        }
    }

    #[test]
    fn test_mode_labels() {
        assert_eq!(OperatingMode::FinalSprint.to_string(), "Final Sprint");
        assert_eq!(
            serde_json::to_string(&OperatingMode::AdamOptimized).unwrap(),
            "\"Adam-optimized\""
        );
        assert!(!OperatingMode::FinalSprint.is_optimized());
        assert!(OperatingMode::CriticalRecovery.is_optimized());
    }

    #[test]
    fn test_stress_factor() {
        let veh = SolarCar::default();
        let strategy = RaceStrategy::default();
        let full = VelocityLoss::new(&veh, &strategy, 0.0, 0.0, 1.0);
        let half = VelocityLoss::new(&veh, &strategy, 0.0, 0.0, 0.5);
        let low = VelocityLoss::new(&veh, &strategy, 0.0, 0.0, 0.1);
        assert_eq!(full.stress_factor(), 1.0);
        assert_eq!(half.stress_factor(), 1.0);
        assert!(almost_eq(low.stress_factor(), 1.4, None));
    }

    #[test]
    fn test_loss_rewards_speed_without_deficit() {
        let veh = SolarCar::default();
        let strategy = RaceStrategy::default();
        // more sun than the car can use at this speed
        let loss = VelocityLoss::new(&veh, &strategy, 0.0, 1e5, 0.8);
        assert_eq!(loss.eval(10.0), -10.0);
        assert_eq!(loss.gradient(10.0), -1.0);
    }

    #[test]
    fn test_loss_penalizes_deficit_more_when_battery_low() {
        let veh = SolarCar::default();
        let strategy = RaceStrategy::default();
        let healthy = VelocityLoss::new(&veh, &strategy, 2.0, 500.0, 0.9);
        let stressed = VelocityLoss::new(&veh, &strategy, 2.0, 500.0, 0.1);
        assert!(stressed.eval(25.0) > healthy.eval(25.0));
    }

    #[test]
    fn test_loss_defined_outside_physical_range() {
        let veh = SolarCar::default();
        let strategy = RaceStrategy::default();
        let loss = VelocityLoss::new(&veh, &strategy, 0.0, 0.0, 1.0);
        assert_eq!(loss.eval(-1e-3), 1e-3);
        assert!(loss.eval(1e3).is_finite());
        assert_eq!(loss.eval(12.5), loss.eval(12.5));
    }

    #[test]
    fn test_analytic_gradient_matches_finite_difference() {
        let veh = SolarCar::default();
        let strategy = RaceStrategy::default();
        for (grade, sun, frac) in [(0.0, 0.0, 1.0), (3.0, 800.0, 0.3), (8.0, 1_200.0, 0.02)] {
            let loss = VelocityLoss::new(&veh, &strategy, grade, sun, frac);
            for speed in [8.0, 15.0, 22.0, 26.0] {
                assert!(
                    almost_eq(loss.gradient(speed), loss.gradient_fd(speed, 1e-3), Some(1e-5)),
                    "grade {grade}, sun {sun}, speed {speed}"
                );
            }
        }
    }

    #[test]
    fn test_dist_to_finish() {
        assert_eq!(dist_to_finish_km(315, 0, 1_000.0), 315.0);
        assert_eq!(dist_to_finish_km(315, 314, 1_000.0), 1.0);
        assert_eq!(dist_to_finish_km(2, 1, 500.0), 0.5);
    }

    #[test]
    fn test_strategy_validation() {
        let mut strategy = RaceStrategy::default();
        assert!(strategy.init().is_ok());
        strategy.min_speed_mps = 0.0;
        assert!(strategy.init().is_err());
    }
}
