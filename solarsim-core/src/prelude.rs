pub use crate::irradiance::IrradianceGenerator;
pub use crate::optimizer::{optimize_velocity, AdamParams, GradientMethod, OptimizerState};
pub use crate::params::PhysicalProperties;
pub use crate::race::{RaceSim, RaceState, RaceSummary, SegmentResult, SegmentResultHistoryVec};
pub use crate::route::{Route, RouteSegment};
pub use crate::strategy::{OperatingMode, RaceStrategy, VelocityLoss};
pub use crate::thermal::{MotorThermal, ThermalSolution, ThermalState};
pub use crate::traits::SerdeAPI;
pub use crate::vehicle::SolarCar;
