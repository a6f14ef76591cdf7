use anyhow::bail;
use clap::{ArgGroup, Parser};
use tracing_subscriber::EnvFilter;

extern crate solarsim_core;
use solarsim_core::prelude::*;
use solarsim_core::utils::round_to;

/// Wrapper for solarsim.
/// After running `cargo build --release`, run a race over the default 315 km route with
/// ```bash
/// ./target/release/solarsim-cli --veh-file solarsim-core/resources/vehicles/default.yaml
/// ```
/// For the steady-state motor winding temperature, run with
/// ```bash
/// ./target/release/solarsim-cli --ambient 298 --torque 100
/// ```
/// Set `RUST_LOG=debug` to log every segment to stderr.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(group(
    ArgGroup::new("vehicle")
    .args(&["veh", "veh-file", "race-file"])
))]
#[clap(group(
    ArgGroup::new("thermal")
    .multiple(true)
    .conflicts_with("vehicle")
    .args(&["ambient", "torque", "motor-file"])
))]
struct SolarSimApi {
    /// Vehicle as json string
    #[clap(long, value_parser)]
    veh: Option<String>,
    /// Path to vehicle file (yaml or json)
    #[clap(long, value_parser)]
    veh_file: Option<String>,
    /// Path to a complete race file (yaml or json) with vehicle, strategy, route, and irradiance
    #[clap(long, value_parser)]
    race_file: Option<String>,
    /// Path to strategy file (yaml or json)
    #[clap(long, value_parser, conflicts_with = "race-file")]
    strategy_file: Option<String>,
    /// Number of altitude samples on the generated route
    #[clap(long, value_parser, conflicts_with = "race-file", default_value_t = 316)]
    num_points: usize,
    /// Altitude at the start of the generated route (m)
    #[clap(long, value_parser, conflicts_with = "race-file", default_value_t = 0.0, allow_hyphen_values = true)]
    alt_start: f64,
    /// Altitude at the end of the generated route (m)
    #[clap(long, value_parser, conflicts_with = "race-file", default_value_t = 200.0, allow_hyphen_values = true)]
    alt_end: f64,
    /// Seed for the irradiance noise
    #[clap(long, value_parser, conflicts_with = "race-file", default_value_t = 42)]
    seed: u64,
    /// Local hour at which the race starts
    #[clap(long, value_parser, conflicts_with = "race-file", default_value_t = 8.0)]
    start_hour: f64,
    /// Race window over which irradiance is sampled (h)
    #[clap(long, value_parser, conflicts_with = "race-file", default_value_t = 5.0)]
    duration_hours: f64,
    /// Irradiance at solar noon (W/m^2)
    #[clap(long, value_parser, conflicts_with = "race-file", default_value_t = 1000.0)]
    peak_irradiance: f64,
    /// Battery state of charge at the start line (%)
    #[clap(long, value_parser)]
    init_battery: Option<f64>,
    /// Ambient temperature for the motor thermal solve (K)
    #[clap(long, value_parser, requires = "torque")]
    ambient: Option<f64>,
    /// Sustained motor torque for the thermal solve (N*m)
    #[clap(long, value_parser, requires = "ambient", allow_hyphen_values = true)]
    torque: Option<f64>,
    /// Path to motor thermal parameter file (yaml or json)
    #[clap(long, value_parser, requires = "ambient")]
    motor_file: Option<String>,
    /// How to return results: `summary`, `json`, `yaml`, or `csv` (race only)
    #[clap(long, value_parser, default_value = "summary")]
    res_fmt: String,
}

fn print_as<T: SerdeAPI>(val: &T, res_fmt: &str) -> anyhow::Result<()> {
    println!("{}", val.to_str(res_fmt)?);
    Ok(())
}

fn run_thermal(api: &SolarSimApi, te_amb_k: f64, torque_nm: f64) -> anyhow::Result<()> {
    let motor = match &api.motor_file {
        Some(path) => MotorThermal::from_file(path)?,
        None => MotorThermal::default(),
    };
    let sol = motor.solve(te_amb_k, torque_nm)?;
    match api.res_fmt.as_str() {
        "summary" => {
            println!(
                "Steady-state winding temperature: {:.2} K",
                round_to(sol.te_winding_k, 2)
            );
            println!("Iterations: {}", sol.iterations);
        }
        "json" | "yaml" => print_as(&sol, &api.res_fmt)?,
        _ => bail!("Invalid option `{}` for `--res-fmt` with a thermal solve", api.res_fmt),
    }
    Ok(())
}

fn build_race(api: &SolarSimApi) -> anyhow::Result<RaceSim> {
    if let Some(race_file) = &api.race_file {
        log::info!("loading race from {race_file}");
        return RaceSim::from_file(race_file);
    }
    let veh = if let Some(veh_json) = &api.veh {
        SolarCar::from_json(veh_json)?
    } else if let Some(veh_file) = &api.veh_file {
        SolarCar::from_file(veh_file)?
    } else {
        SolarCar::default()
    };
    let strategy = match &api.strategy_file {
        Some(path) => RaceStrategy::from_file(path)?,
        None => RaceStrategy::default(),
    };
    let route = Route::linear(api.alt_start, api.alt_end, api.num_points)?;
    log::info!(
        "generated {:.0} km route from {} m to {} m",
        route.length_km(),
        api.alt_start,
        api.alt_end
    );
    let mut irradiance = IrradianceGenerator {
        start_hour: api.start_hour,
        duration_hours: api.duration_hours,
        peak_w_per_m2: api.peak_irradiance,
        ..Default::default()
    }
    .with_seed(api.seed);
    irradiance.init()?;
    RaceSim::with_generated_irradiance(veh, strategy, route, &irradiance)
}

fn run_race(api: &SolarSimApi) -> anyhow::Result<()> {
    let mut sim = build_race(api)?;
    if let Some(init_battery) = api.init_battery {
        sim.set_init_battery_frac(init_battery / 100.0)?;
    }
    sim.walk()?;
    let summary = sim.summary();
    match api.res_fmt.as_str() {
        "summary" => {
            println!("Race time: {:.2} h", summary.race_time_h);
            println!("Final battery: {:.2}%", summary.final_battery_perc);
            println!("Distance: {:.1} km", summary.distance_km);
            println!("Mean velocity: {:.2} km/h", summary.mean_velocity_kmh);
            for (mode, segments) in [
                (OperatingMode::FinalSprint, summary.final_sprint_segments),
                (OperatingMode::CriticalRecovery, summary.critical_recovery_segments),
                (OperatingMode::AdamOptimized, summary.adam_optimized_segments),
            ] {
                println!("{mode} segments: {segments}");
            }
        }
        "json" | "yaml" => print_as(&summary, &api.res_fmt)?,
        "csv" => sim.history.to_csv_writer(std::io::stdout())?,
        _ => bail!("Invalid option `{}` for `--res-fmt`", api.res_fmt),
    }
    Ok(())
}

pub fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let api = SolarSimApi::parse();

    match (api.ambient, api.torque) {
        (Some(te_amb_k), Some(torque_nm)) => run_thermal(&api, te_amb_k, torque_nm),
        _ => run_race(&api),
    }
}
