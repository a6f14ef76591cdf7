//! Crate containing models for segment-by-segment velocity strategy and energy balance of a
//! solar race car, plus a steady-state thermal model of the traction motor winding.
//!
//! The entry point for a race is [`race::RaceSim`], which walks a [`route::Route`] and,
//! at every segment, picks an [`strategy::OperatingMode`] and a velocity chosen by
//! [`optimizer::optimize_velocity`].

#[macro_use]
pub mod macros;

pub mod imports;
pub mod irradiance;
pub mod optimizer;
pub mod params;
pub mod prelude;
pub mod race;
pub mod route;
pub mod strategy;
pub mod thermal;
pub mod traits;
pub mod utils;
pub mod vehicle;
