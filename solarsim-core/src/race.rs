//! Module containing the segment-by-segment race simulation.

use crate::imports::*;
use crate::irradiance::IrradianceGenerator;
use crate::optimizer::optimize_velocity;
use crate::params::*;
use crate::route::Route;
use crate::strategy::{dist_to_finish_km, OperatingMode, RaceStrategy, VelocityLoss};
use crate::vehicle::SolarCar;

/// Running state carried from one segment to the next
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct RaceState {
    /// index of the next segment to drive
    pub i: usize,
    /// battery energy, $Wh$
    pub ess_wh: f64,
    /// elapsed race time, $s$
    pub time_s: f64,
    /// distance covered, $m$
    pub dist_m: f64,
}

impl RaceState {
    pub fn new(ess_wh: f64) -> Self {
        Self {
            ess_wh,
            ..Default::default()
        }
    }
}

/// Outcome of driving one segment
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SegmentResult {
    pub index: usize,
    pub mode: OperatingMode,
    pub grade_perc: f64,
    pub solar_pwr_watts: f64,
    pub speed_mps: f64,
    pub pwr_need_watts: f64,
    /// time to traverse the segment, $s$
    pub dt_s: f64,
    /// battery energy after the segment, $Wh$
    pub ess_wh: f64,
    /// cumulative distance at the end of the segment, $km$
    pub distance_km: f64,
    pub velocity_kmh: f64,
    /// battery state of charge after the segment, $\%$
    pub battery_perc: f64,
}

/// Parallel per-segment profiles, one entry per driven segment
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SegmentResultHistoryVec {
    pub distance_km: Vec<f64>,
    pub velocity_kmh: Vec<f64>,
    pub battery_perc: Vec<f64>,
    pub mode: Vec<OperatingMode>,
    pub grade_perc: Vec<f64>,
    pub solar_pwr_watts: Vec<f64>,
    pub pwr_need_watts: Vec<f64>,
    pub dt_s: Vec<f64>,
}

#[derive(Serialize)]
struct CsvRow {
    distance_km: f64,
    velocity_kmh: f64,
    battery_pct: f64,
    mode: OperatingMode,
}

impl SegmentResultHistoryVec {
    pub fn push(&mut self, res: SegmentResult) {
        self.distance_km.push(res.distance_km);
        self.velocity_kmh.push(res.velocity_kmh);
        self.battery_perc.push(res.battery_perc);
        self.mode.push(res.mode);
        self.grade_perc.push(res.grade_perc);
        self.solar_pwr_watts.push(res.solar_pwr_watts);
        self.pwr_need_watts.push(res.pwr_need_watts);
        self.dt_s.push(res.dt_s);
    }

    pub fn len(&self) -> usize {
        self.distance_km.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `distance_km,velocity_kmh,battery_pct,mode` rows
    pub fn to_csv_writer<W: std::io::Write>(&self, wtr: W) -> anyhow::Result<()> {
        let mut wtr = csv::Writer::from_writer(wtr);
        for i in 0..self.len() {
            wtr.serialize(CsvRow {
                distance_km: self.distance_km[i],
                velocity_kmh: self.velocity_kmh[i],
                battery_pct: self.battery_perc[i],
                mode: self.mode[i],
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl SerdeAPI for SegmentResultHistoryVec {}

/// Trip statistics
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RaceSummary {
    pub segments: usize,
    pub race_time_s: f64,
    pub race_time_h: f64,
    pub distance_km: f64,
    pub final_battery_perc: f64,
    pub mean_velocity_kmh: f64,
    pub final_sprint_segments: usize,
    pub critical_recovery_segments: usize,
    pub adam_optimized_segments: usize,
}

impl SerdeAPI for RaceSummary {}

/// Drives a [`SolarCar`] over a [`Route`] under a [`RaceStrategy`], one segment at a time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RaceSim {
    pub veh: SolarCar,
    #[serde(default)]
    pub strategy: RaceStrategy,
    pub route: Route,
    /// Irradiance on each segment, $\frac{W}{m^2}$; at least one value per segment
    pub irradiance_w_per_m2: Array1<f64>,
    /// Battery fraction at the start line
    #[serde(default = "full_battery")]
    pub init_battery_frac: f64,
    #[serde(default)]
    pub state: RaceState,
    #[serde(default)]
    pub history: SegmentResultHistoryVec,
}

fn full_battery() -> f64 {
    1.0
}

impl RaceSim {
    pub fn new(
        veh: SolarCar,
        strategy: RaceStrategy,
        route: Route,
        irradiance_w_per_m2: Array1<f64>,
    ) -> anyhow::Result<Self> {
        let mut sim = Self {
            veh,
            strategy,
            route,
            irradiance_w_per_m2,
            init_battery_frac: full_battery(),
            state: Default::default(),
            history: Default::default(),
        };
        sim.init()?;
        Ok(sim)
    }

    /// Race with irradiance sampled by `irradiance` once per route point
    pub fn with_generated_irradiance(
        veh: SolarCar,
        strategy: RaceStrategy,
        route: Route,
        irradiance: &IrradianceGenerator,
    ) -> anyhow::Result<Self> {
        let irradiance_w_per_m2 = irradiance
            .clone()
            .with_num_points(route.num_points())
            .generate()?;
        Self::new(veh, strategy, route, irradiance_w_per_m2)
    }

    /// Sets the starting battery fraction; only allowed before the first segment is driven
    pub fn set_init_battery_frac(&mut self, frac: f64) -> anyhow::Result<()> {
        ensure!(
            (0.0..=1.0).contains(&frac),
            "battery fraction must be in [0, 1], got {frac}"
        );
        ensure!(
            self.history.is_empty(),
            "cannot change the starting battery after segment {}",
            self.state.i
        );
        self.init_battery_frac = frac;
        self.state = RaceState::new(frac * self.veh.ess_max_wh);
        Ok(())
    }

    pub fn battery_frac(&self) -> f64 {
        self.state.ess_wh / self.veh.ess_max_wh
    }

    /// Drives every remaining segment of the route
    pub fn walk(&mut self) -> anyhow::Result<()> {
        ensure!(
            self.route.num_points() >= 2,
            "insufficient route data: need at least 2 altitude samples, got {}",
            self.route.num_points()
        );
        while self.state.i < self.route.num_segments() {
            let res = self.solve_step()?;
            self.step(res);
        }
        let summary = self.summary();
        log::info!(
            "Race time: {:.2} h  |  Final battery: {:.2}%",
            summary.race_time_h,
            summary.final_battery_perc
        );
        Ok(())
    }

    /// Computes the current segment's physics without touching the running state
    pub fn solve_step(&self) -> anyhow::Result<SegmentResult> {
        let i = self.state.i;
        let seg = self.route.segment(i)?;
        let irradiance = *self.irradiance_w_per_m2.get(i).with_context(|| {
            format!(
                "no irradiance for segment {i}; {} values for {} segments",
                self.irradiance_w_per_m2.len(),
                self.route.num_segments()
            )
        })?;

        let battery_frac = self.battery_frac();
        let dist_to_finish = dist_to_finish_km(self.route.num_segments(), i, seg.segment_length_m);
        let mode = OperatingMode::select(dist_to_finish, battery_frac, &self.strategy);

        let grade_perc = seg.grade_perc();
        let solar_pwr_watts = self.veh.solar_power(irradiance);

        let speed_mps = if mode.is_optimized() {
            let loss =
                VelocityLoss::new(&self.veh, &self.strategy, grade_perc, solar_pwr_watts, battery_frac);
            optimize_velocity(&loss, self.strategy.seed_speed_mps(mode))
        } else {
            self.strategy.seed_speed_mps(mode)
        };

        let dt_s = seg.segment_length_m / speed_mps.max(self.strategy.min_speed_mps);
        let pwr_need_watts = self.veh.power_needed(speed_mps, grade_perc);
        let energy_need_wh = energy_wh(pwr_need_watts, dt_s);
        let energy_from_sun_wh = energy_wh(solar_pwr_watts, dt_s);

        let ess_wh = if energy_from_sun_wh >= energy_need_wh {
            (self.state.ess_wh + (energy_from_sun_wh - energy_need_wh)).min(self.veh.ess_max_wh)
        } else {
            (self.state.ess_wh - (energy_need_wh - energy_from_sun_wh)).max(0.0)
        };

        log::debug!(
            "segment {i}: {mode}, grade {grade_perc:.2}%, {:.1} km/h, battery {:.1}%",
            mps_to_kmh(speed_mps),
            ess_wh / self.veh.ess_max_wh * 100.0
        );

        Ok(SegmentResult {
            index: i,
            mode,
            grade_perc,
            solar_pwr_watts,
            speed_mps,
            pwr_need_watts,
            dt_s,
            ess_wh,
            distance_km: (self.state.dist_m + seg.segment_length_m) / M_PER_KM,
            velocity_kmh: mps_to_kmh(speed_mps),
            battery_perc: ess_wh / self.veh.ess_max_wh * 100.0,
        })
    }

    /// Commits a solved segment to the running state
    fn step(&mut self, res: SegmentResult) {
        if res.ess_wh == 0.0 && self.state.ess_wh > 0.0 {
            log::warn!("battery depleted on segment {}", res.index);
        }
        self.state.ess_wh = res.ess_wh;
        self.state.time_s += res.dt_s;
        self.state.dist_m += self.route.segment_length_m;
        self.state.i += 1;
        self.history.push(res);
    }

    pub fn summary(&self) -> RaceSummary {
        let count = |mode: OperatingMode| self.history.mode.iter().filter(|&&m| m == mode).count();
        let segments = self.history.len();
        RaceSummary {
            segments,
            race_time_s: self.state.time_s,
            race_time_h: self.state.time_s / S_PER_H,
            distance_km: self.state.dist_m / M_PER_KM,
            final_battery_perc: self.battery_frac() * 100.0,
            mean_velocity_kmh: if self.state.time_s > 0.0 {
                mps_to_kmh(self.state.dist_m / self.state.time_s)
            } else {
                0.0
            },
            final_sprint_segments: count(OperatingMode::FinalSprint),
            critical_recovery_segments: count(OperatingMode::CriticalRecovery),
            adam_optimized_segments: count(OperatingMode::AdamOptimized),
        }
    }
}

impl SerdeAPI for RaceSim {
    fn init(&mut self) -> anyhow::Result<()> {
        self.veh.init()?;
        self.strategy.init()?;
        self.route.init()?;
        ensure!(
            self.irradiance_w_per_m2.len() >= self.route.num_segments(),
            "irradiance has {} values but route has {} segments",
            self.irradiance_w_per_m2.len(),
            self.route.num_segments()
        );
        ensure!(
            self.irradiance_w_per_m2
                .iter()
                .all(|irr| irr.is_finite() && *irr >= 0.0),
            "irradiance values must be finite and non-negative"
        );
        if self.history.is_empty() {
            self.set_init_battery_frac(self.init_battery_frac)?;
        }
        Ok(())
    }
}
