//! Synthetic solar irradiance profile for a daytime race.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::imports::*;

/// Hours between sunrise and sunset
pub const DAYLIGHT_HOURS: f64 = 12.0;
/// Local hour of sunrise
pub const SUNRISE_HOUR: f64 = 6.0;

/// Generates a clear-sky irradiance curve over the race window.
///
/// The curve is a half sine over daylight hours peaking at solar noon, sampled at
/// `num_points` evenly spaced instants between `start_hour` and `start_hour + duration_hours`.
/// Gaussian noise from a seeded RNG is added, so the same seed always gives the same curve.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IrradianceGenerator {
    pub num_points: usize,
    /// Local hour at which the race starts
    pub start_hour: f64,
    pub duration_hours: f64,
    /// Irradiance at solar noon, $\frac{W}{m^2}$
    pub peak_w_per_m2: f64,
    /// Standard deviation of the additive noise, $\frac{W}{m^2}$
    pub noise_std_w_per_m2: f64,
    pub seed: u64,
}

impl Default for IrradianceGenerator {
    fn default() -> Self {
        Self {
            num_points: 316,
            start_hour: 8.0,
            duration_hours: 5.0,
            peak_w_per_m2: 1_000.0,
            noise_std_w_per_m2: 15.0,
            seed: 42,
        }
    }
}

impl IrradianceGenerator {
    pub fn with_num_points(mut self, num_points: usize) -> Self {
        self.num_points = num_points;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks that the noise spread and race window are non-negative
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.noise_std_w_per_m2 >= 0.0,
            format_dbg!(self.noise_std_w_per_m2)
        );
        ensure!(self.duration_hours >= 0.0, format_dbg!(self.duration_hours));
        Ok(())
    }

    /// Noise-free irradiance at `hours_since_sunrise`, $\frac{W}{m^2}$
    pub fn clear_sky(&self, hours_since_sunrise: f64) -> f64 {
        self.peak_w_per_m2 * (std::f64::consts::PI * hours_since_sunrise / DAYLIGHT_HOURS).sin()
    }

    /// Irradiance samples, non-negative and truncated to whole $\frac{W}{m^2}$
    pub fn generate(&self) -> anyhow::Result<Array1<f64>> {
        self.validate()?;
        let noise = Normal::new(0.0, self.noise_std_w_per_m2)
            .with_context(|| format_dbg!(self.noise_std_w_per_m2))?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let start = self.start_hour - SUNRISE_HOUR;
        let hours = linspace(start, start + self.duration_hours, self.num_points);
        Ok(hours
            .into_iter()
            .map(|h| (self.clear_sky(h) + noise.sample(&mut rng)).max(0.0).trunc())
            .collect())
    }
}

impl SerdeAPI for IrradianceGenerator {
    fn init(&mut self) -> anyhow::Result<()> {
        self.validate()
    }
}
