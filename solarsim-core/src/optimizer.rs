//! Adaptive moment estimation (Adam) refinement of a single segment's velocity.
//!
//! Each call runs a fixed number of steps with no convergence check, so the cost per segment
//! is bounded and the result is fully determined by the inputs.

use crate::imports::*;
use crate::strategy::VelocityLoss;

/// How the loss gradient is obtained at each step
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum GradientMethod {
    /// Central difference with fixed `step`, $\frac{m}{s}$
    CentralDifference { step: f64 },
    /// Closed-form derivative of the loss
    Analytic,
}

impl Default for GradientMethod {
    fn default() -> Self {
        Self::CentralDifference { step: 1e-3 }
    }
}

/// Hyper-parameters of the Adam update
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AdamParams {
    pub learning_rate: f64,
    /// decay rate of the first moment estimate
    pub beta1: f64,
    /// decay rate of the second moment estimate
    pub beta2: f64,
    pub eps: f64,
    /// number of update steps per call
    pub steps: usize,
    #[serde(default)]
    pub gradient: GradientMethod,
}

impl Default for AdamParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.03,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            steps: 40,
            gradient: GradientMethod::default(),
        }
    }
}

impl SerdeAPI for AdamParams {
    fn init(&mut self) -> anyhow::Result<()> {
        ensure!(
            (0.0..1.0).contains(&self.beta1) && (0.0..1.0).contains(&self.beta2),
            "decay rates must be in [0, 1), got beta1 = {}, beta2 = {}",
            self.beta1,
            self.beta2
        );
        ensure!(self.learning_rate > 0.0, format_dbg!(self.learning_rate));
        ensure!(self.eps > 0.0, format_dbg!(self.eps));
        if let GradientMethod::CentralDifference { step } = self.gradient {
            ensure!(step > 0.0, format_dbg!(step));
        }
        Ok(())
    }
}

/// Transient state of one optimizer call
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OptimizerState {
    pub speed_mps: f64,
    /// biased first moment estimate
    pub m: f64,
    /// biased second moment estimate
    pub s: f64,
    /// 1-indexed count of completed steps
    pub t: i32,
}

impl OptimizerState {
    pub fn new(speed_mps: f64) -> Self {
        Self {
            speed_mps,
            ..Default::default()
        }
    }

    /// Applies one Adam update for `grad`, then projects the speed onto `[min, max]`.
    /// Inverted bounds collapse to `max`.
    pub fn step(&mut self, params: &AdamParams, grad: f64, min_speed_mps: f64, max_speed_mps: f64) {
        self.t += 1;
        self.m = params.beta1 * self.m + (1.0 - params.beta1) * grad;
        self.s = params.beta2 * self.s + (1.0 - params.beta2) * grad.powi(2);
        let m_hat = self.m / (1.0 - params.beta1.powi(self.t));
        let s_hat = self.s / (1.0 - params.beta2.powi(self.t));
        self.speed_mps -= params.learning_rate * m_hat / (s_hat.sqrt() + params.eps);
        self.speed_mps = self.speed_mps.max(min_speed_mps).min(max_speed_mps);
    }
}

/// Refines `speed_init_mps` toward a local minimum of `loss`.
/// The result always lies within the strategy's `[min_speed_mps, max_speed_mps]`; a strategy
/// whose minimum exceeds its maximum pins the result to the minimum.
pub fn optimize_velocity(loss: &VelocityLoss, speed_init_mps: f64) -> f64 {
    let params = &loss.strategy.adam;
    let min_speed = loss.strategy.min_speed_mps;
    let max_speed = loss.strategy.max_speed_mps().max(min_speed);
    let mut state = OptimizerState::new(speed_init_mps);
    for _ in 0..params.steps {
        let grad = match params.gradient {
            GradientMethod::CentralDifference { step } => {
                loss.gradient_fd(state.speed_mps, step)
            }
            GradientMethod::Analytic => loss.gradient(state.speed_mps),
        };
        state.step(params, grad, min_speed, max_speed);
    }
    // a zero step budget still honors the bounds
    state.speed_mps.max(min_speed).min(max_speed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::kmh_to_mps;
    use crate::strategy::RaceStrategy;
    use crate::vehicle::SolarCar;

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let params = AdamParams::default();
        let mut state = OptimizerState::new(10.0);
        state.step(&params, -2.0, 0.1, 30.0);
        // bias correction makes the first step exactly lr * sign(grad)
        assert!(almost_eq(state.speed_mps, 10.03, Some(1e-6)));
        assert_eq!(state.t, 1);
    }

    #[test]
    fn test_step_projects_onto_bounds() {
        let params = AdamParams {
            learning_rate: 5.0,
            ..Default::default()
        };
        let mut state = OptimizerState::new(1.0);
        state.step(&params, 1.0, 0.1, 30.0);
        assert_eq!(state.speed_mps, 0.1);
        let mut state = OptimizerState::new(29.0);
        state.step(&params, -1.0, 0.1, 30.0);
        assert_eq!(state.speed_mps, 30.0);
    }

    #[test]
    fn test_output_within_bounds() {
        let veh = SolarCar::default();
        let strategy = RaceStrategy::default();
        let max_speed = strategy.max_speed_mps();
        for grade in [-40.0, -5.0, 0.0, 7.0, 60.0, 200.0] {
            for sun in [0.0, 300.0, 1_320.0] {
                for frac in [0.0, 0.05, 0.5, 1.0] {
                    let loss = VelocityLoss::new(&veh, &strategy, grade, sun, frac);
                    for seed in [-50.0, 0.0, 2.7, 26.0, 500.0] {
                        let speed = optimize_velocity(&loss, seed);
                        assert!(
                            (strategy.min_speed_mps..=max_speed).contains(&speed),
                            "speed {speed} out of bounds for grade {grade}, seed {seed}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_flat_sunny_stays_at_target() {
        let veh = SolarCar::default();
        let strategy = RaceStrategy::default();
        let loss = VelocityLoss::new(&veh, &strategy, 0.0, veh.solar_power(800.0), 1.0);
        let speed = optimize_velocity(&loss, strategy.max_speed_mps());
        assert_eq!(speed, strategy.max_speed_mps());
    }

    #[test]
    fn test_recovery_seed_climbs() {
        let veh = SolarCar::default();
        let strategy = RaceStrategy::default();
        let loss = VelocityLoss::new(&veh, &strategy, 0.0, 0.0, 0.02);
        let seed = kmh_to_mps(strategy.recovery_speed_kmh);
        let speed = optimize_velocity(&loss, seed);
        assert!(speed > seed);
        // each Adam step moves at most about one learning rate
        assert!(speed <= seed + strategy.adam.learning_rate * strategy.adam.steps as f64 + 1e-9);
    }

    #[test]
    fn test_heavy_penalty_slows_down() {
        let veh = SolarCar::default();
        let strategy = RaceStrategy {
            deficit_weight: 0.01,
            ..Default::default()
        };
        let loss = VelocityLoss::new(&veh, &strategy, 0.0, 0.0, 0.2);
        let speed = optimize_velocity(&loss, strategy.max_speed_mps());
        assert!(speed < strategy.max_speed_mps() - 0.5);
    }

    #[test]
    fn test_deterministic() {
        let veh = SolarCar::default();
        let strategy = RaceStrategy {
            deficit_weight: 0.01,
            ..Default::default()
        };
        let loss = VelocityLoss::new(&veh, &strategy, 1.5, 400.0, 0.4);
        assert_eq!(
            optimize_velocity(&loss, 20.0),
            optimize_velocity(&loss, 20.0)
        );
    }

    #[test]
    fn test_analytic_matches_finite_difference() {
        let veh = SolarCar::default();
        let fd = RaceStrategy {
            deficit_weight: 0.01,
            ..Default::default()
        };
        let mut analytic = fd.clone();
        analytic.adam.gradient = GradientMethod::Analytic;
        for (grade, sun, frac) in [(0.0, 0.0, 0.2), (4.0, 900.0, 0.6), (-2.0, 100.0, 0.05)] {
            let speed_fd = optimize_velocity(&VelocityLoss::new(&veh, &fd, grade, sun, frac), 20.0);
            let speed_an =
                optimize_velocity(&VelocityLoss::new(&veh, &analytic, grade, sun, frac), 20.0);
            assert!(
                almost_eq(speed_fd, speed_an, Some(1e-4)),
                "grade {grade}: {speed_fd} vs {speed_an}"
            );
        }
    }

    #[test]
    fn test_zero_steps_clamps_seed() {
        let veh = SolarCar::default();
        let mut strategy = RaceStrategy::default();
        strategy.adam.steps = 0;
        let loss = VelocityLoss::new(&veh, &strategy, 0.0, 0.0, 1.0);
        assert_eq!(optimize_velocity(&loss, 100.0), strategy.max_speed_mps());
        assert_eq!(optimize_velocity(&loss, -1.0), strategy.min_speed_mps);
    }

    #[test]
    fn test_inverted_bounds_do_not_panic() {
        let veh = SolarCar::default();
        // never passed through init(), so min exceeds max
        let strategy = RaceStrategy {
            min_speed_mps: 30.0,
            ..Default::default()
        };
        let loss = VelocityLoss::new(&veh, &strategy, 0.0, 500.0, 0.6);
        assert_eq!(optimize_velocity(&loss, 10.0), 30.0);

        let mut state = OptimizerState::new(20.0);
        state.step(&strategy.adam, -1.0, 30.0, 26.0);
        assert_eq!(state.speed_mps, 26.0);
    }

    #[test]
    fn test_param_validation() {
        let mut params = AdamParams::default();
        assert!(params.init().is_ok());
        params.beta1 = 1.0;
        assert!(params.init().is_err());
        let mut params = AdamParams {
            gradient: GradientMethod::CentralDifference { step: 0.0 },
            ..Default::default()
        };
        assert!(params.init().is_err());
    }
}
