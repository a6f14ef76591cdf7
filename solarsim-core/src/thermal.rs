//! Module for solving the steady-state winding temperature of a permanent magnet motor
//! under sustained torque.
//!
//! Winding losses heat the winding, the winding temperature raises resistance and weakens the
//! magnets, and both effects raise the losses again. [`MotorThermal::solve`] iterates this
//! loop until successive winding temperatures agree within `tol_k`.

use crate::imports::*;

/// Motor electromagnetic and thermal coefficients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MotorThermal {
    /// Initial winding temperature guess, $K$
    pub te_winding_init_k: f64,
    /// Reference temperature for remanence and resistance, $K$
    pub te_ref_k: f64,
    /// Magnet remanence at `te_ref_k`, $T$
    pub remanence_ref_t: f64,
    /// Remanence loss per kelvin above `te_ref_k`, $\frac{T}{K}$
    pub remanence_temp_coeff: f64,
    /// Phase current per unit remanence and torque, $\frac{A}{T N m}$
    pub current_per_remanence_torque: f64,
    /// Phase resistance at `te_ref_k`, $\Omega$
    pub resistance_ref_ohm: f64,
    /// Fractional resistance growth per kelvin above `te_ref_k`
    pub resistance_temp_coeff: f64,
    pub num_phases: f64,
    /// Eddy current loss coefficient
    pub eddy_loss_coeff: f64,
    /// Winding-to-ambient thermal resistance, $\frac{K}{W}$
    pub thermal_resistance_k_per_w: f64,
    /// Convergence tolerance on successive winding temperatures, $K$
    pub tol_k: f64,
    pub max_iter: usize,
}

impl Default for MotorThermal {
    fn default() -> Self {
        Self {
            te_winding_init_k: 323.0,
            te_ref_k: 293.0,
            remanence_ref_t: 1.32,
            remanence_temp_coeff: 1.2e-3,
            current_per_remanence_torque: 0.561,
            resistance_ref_ohm: 0.0575,
            resistance_temp_coeff: 0.0039,
            num_phases: 3.0,
            eddy_loss_coeff: 9.602e-6,
            thermal_resistance_k_per_w: 0.455,
            tol_k: 1.0,
            max_iter: 200,
        }
    }
}

impl SerdeAPI for MotorThermal {
    fn init(&mut self) -> anyhow::Result<()> {
        ensure!(self.tol_k > 0.0, format_dbg!(self.tol_k));
        ensure!(self.max_iter > 0, format_dbg!(self.max_iter));
        Ok(())
    }
}

/// Temperatures and losses evaluated during one fixed-point iteration
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct ThermalState {
    pub te_amb_k: f64,
    /// winding temperature estimate the iteration started from
    pub te_winding_k: f64,
    pub te_magnet_k: f64,
    pub remanence_t: f64,
    pub current_a: f64,
    pub resistance_ohm: f64,
    pub copper_loss_w: f64,
    pub eddy_loss_w: f64,
    /// updated winding temperature estimate
    pub te_winding_next_k: f64,
}

/// Result of a converged solve
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ThermalSolution {
    /// Converged winding temperature, unrounded, $K$
    pub te_winding_k: f64,
    pub iterations: usize,
    pub history: Vec<ThermalState>,
}

impl SerdeAPI for ThermalSolution {}

impl MotorThermal {
    /// One fixed-point update starting from winding temperature `te_winding_k`
    pub fn iterate(&self, te_amb_k: f64, torque_nm: f64, te_winding_k: f64) -> ThermalState {
        let te_magnet_k = (te_amb_k + te_winding_k) / 2.0;
        let remanence_t =
            self.remanence_ref_t - self.remanence_temp_coeff * (te_magnet_k - self.te_ref_k);
        let current_a = self.current_per_remanence_torque * remanence_t * torque_nm;
        let resistance_ohm = self.resistance_ref_ohm
            * (1.0 + self.resistance_temp_coeff * (te_winding_k - self.te_ref_k));
        let copper_loss_w = self.num_phases * current_a.powi(2) * resistance_ohm;
        let eddy_loss_w = if resistance_ohm > 0.0 {
            self.eddy_loss_coeff * (remanence_t * torque_nm).powi(2) / resistance_ohm
        } else {
            0.0
        };
        ThermalState {
            te_amb_k,
            te_winding_k,
            te_magnet_k,
            remanence_t,
            current_a,
            resistance_ohm,
            copper_loss_w,
            eddy_loss_w,
            te_winding_next_k: te_amb_k
                + self.thermal_resistance_k_per_w * (copper_loss_w + eddy_loss_w),
        }
    }

    /// Iterates winding temperature to a fixed point.
    /// Fails if the estimate is still moving by `tol_k` or more after `max_iter` updates.
    pub fn solve(&self, te_amb_k: f64, torque_nm: f64) -> anyhow::Result<ThermalSolution> {
        ensure!(
            te_amb_k.is_finite() && torque_nm.is_finite(),
            "ambient temperature and torque must be finite, got {te_amb_k} K and {torque_nm} N*m"
        );
        let mut te_winding_k = self.te_winding_init_k;
        let mut history = Vec::new();
        for iter in 1..=self.max_iter {
            let state = self.iterate(te_amb_k, torque_nm, te_winding_k);
            history.push(state);
            let delta = (state.te_winding_next_k - te_winding_k).abs();
            te_winding_k = state.te_winding_next_k;
            ensure!(
                te_winding_k.is_finite(),
                "winding temperature diverged to {te_winding_k} after {iter} iterations"
            );
            if delta < self.tol_k {
                if iter > self.max_iter / 2 {
                    log::warn!(
                        "thermal solve needed {iter} of {} iterations for {te_amb_k} K, {torque_nm} N*m",
                        self.max_iter
                    );
                }
                return Ok(ThermalSolution {
                    te_winding_k,
                    iterations: iter,
                    history,
                });
            }
        }
        bail!(
            "thermal solve did not converge within {} iterations for {te_amb_k} K, {torque_nm} N*m; last estimate {te_winding_k:.2} K",
            self.max_iter
        )
    }

    /// Steady-state winding temperature, $K$, rounded to 2 decimal places
    pub fn steady_state_temp(&self, te_amb_k: f64, torque_nm: f64) -> anyhow::Result<f64> {
        Ok(round_to(self.solve(te_amb_k, torque_nm)?.te_winding_k, 2))
    }
}
