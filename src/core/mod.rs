//! Density-matrix backend used by the simulated network.

mod gates;
mod measurements;
pub mod noise;
mod state;
pub mod utils;

pub use gates::Gate;
pub use measurements::{Measurement, MeasurementResult};
pub use noise::{NoiseChannel, NoiseModel};
pub use state::QuantumState;
