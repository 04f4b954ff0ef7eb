//! Round-synchronized simulation of multi-party quantum protocols.
//!
//! A [`ProtocolCoordinator`] runs one task per party against a
//! [`QuantumNetwork`]; each party records one [`RoundRecord`] per round, and
//! the [`stats`] module turns the completed buffers into keys, error rates,
//! Bell correlations and certified randomness.

pub mod basis;
pub mod config;
pub mod coordinator;
mod core;
pub mod errors;
pub mod network;
pub mod party;
pub mod protocols;
pub mod record;
pub mod stats;
pub mod sync;

pub use crate::basis::{BasisLabel, Bb84Basis, BellBasis, Rotation};
pub use crate::config::{AnalysisConfig, LinkSettings, NetworkConfig, PartyConfig, Role, RunConfig};
pub use crate::coordinator::{ProtocolCoordinator, RunResults};
pub use crate::core::{Gate, Measurement, MeasurementResult, NoiseChannel, NoiseModel, QuantumState, utils};
pub use crate::network::{QuantumLink, QuantumNetwork, ResourceKind, SimulatedNetwork};
pub use crate::party::{PartyRole, PartyState};
pub use crate::record::{BasisChoice, ResourceId, ResultBuffer, RoundRecord};
pub use crate::sync::{CancellationToken, RoundBarrier};
