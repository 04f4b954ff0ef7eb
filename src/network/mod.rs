//! Quantum channel abstraction used by the party state machine.
//!
//! A [`QuantumNetwork`] hands out one [`QuantumLink`] per node. Parties only
//! talk to their link, so the coordinator can run against the simulated
//! backend or any other implementation of these traits.

mod simulated;

use serde::{Deserialize, Serialize};

use crate::basis::Rotation;
use crate::errors::LinkError;
use crate::record::ResourceId;
use crate::sync::CancellationToken;

pub use simulated::{SimQubit, SimulatedLink, SimulatedNetwork};

/// Kind of resource a generator prepares each round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// One qubit in |0>
    Single,
    /// Two qubits in (|00> + |11>) / sqrt(2)
    EprPair,
    /// Four-qubit entangled state used by the amplification experiment
    FourPartite,
}

impl ResourceKind {
    pub fn qubits(&self) -> usize {
        match self {
            ResourceKind::Single => 1,
            ResourceKind::EprPair => 2,
            ResourceKind::FourPartite => 4,
        }
    }
}

/// One node's endpoint of the network.
pub trait QuantumLink: Send {
    /// Handle to a qubit held by this node.
    type Qubit: Send;

    fn node(&self) -> &str;

    fn connect(&mut self) -> Result<(), LinkError>;

    /// Prepares a fresh resource and returns its qubits in slot order.
    ///
    /// May fail with the transient [`LinkError::ResourceUnavailable`].
    fn prepare(&mut self, kind: ResourceKind) -> Result<Vec<Self::Qubit>, LinkError>;

    fn resource_id(&self, qubit: &Self::Qubit) -> ResourceId;

    fn send(&mut self, qubit: Self::Qubit, destination: &str) -> Result<(), LinkError>;

    /// Blocks until a qubit arrives, the link times out or the run is cancelled.
    fn receive(&mut self) -> Result<Self::Qubit, LinkError>;

    fn apply_basis_transform(
        &mut self,
        qubit: &Self::Qubit,
        ops: &[Rotation],
    ) -> Result<(), LinkError>;

    /// Measures in the computational basis, consuming the handle.
    fn measure(&mut self, qubit: Self::Qubit) -> Result<u8, LinkError>;

    fn disconnect(&mut self) -> Result<(), LinkError>;
}

/// A set of nodes joined by directed quantum links.
pub trait QuantumNetwork: Sync {
    type Link: QuantumLink;

    fn has_node(&self, node: &str) -> bool;

    fn is_adjacent(&self, from: &str, to: &str) -> bool;

    /// Opens the endpoint of `node`; blocking calls on it give up once
    /// `cancel` fires.
    fn link(&self, node: &str, cancel: CancellationToken) -> Result<Self::Link, LinkError>;

    /// Tears the network down. Further calls are no-ops.
    fn shutdown(&mut self);
}
