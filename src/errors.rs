use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum GateError {
    #[error("Matrix is not Unitary (U†U != I)")]
    NonUnitary,

    #[error("Matrix must be square")]
    NotSquareMatrix,

    #[error("Invalid Dimensions")]
    InvalidDimensions,

    #[error("Qubit {0} cannot be both control and target")]
    ControlTargetOverlap(usize),

    #[error("Duplicate qubit index found: {0}")]
    DuplicateQubit(usize),
}

#[derive(Error, Debug, Clone)]
pub enum MeasurementError {
    #[error("Number of operators ({ops}) does not match number of values ({vals})")]
    CountMismatch { ops: usize, vals: usize },

    #[error("Measurement operators do not sum to Identity (Completeness relation failed)")]
    NotComplete,

    #[error("Invalid operator dimensions")]
    InvalidDimensions,

    #[error("Duplicate qubit index found: {0}")]
    DuplicateQubit(usize),
}

#[derive(Error, Debug, Clone)]
pub enum NoiseError {
    #[error("Noise channel must have at least one Kraus operator")]
    Empty,

    #[error("Kraus operators do not sum to Identity (Trace preserving relation failed)")]
    NotComplete,

    #[error("Invalid operator dimensions: Matrices must be square and 2^n")]
    InvalidDimensions,

    #[error("Dimension mismatch: All Kraus operators must have the same size")]
    OperatorSizeMismatch,

    #[error("Invalid probability: {0}. Must be between 0.0 and 1.0")]
    InvalidProbability(f64),

    #[error("Duplicate qubit index found: {0}")]
    DuplicateQubit(usize),
}

#[derive(Error, Debug, Clone)]
pub enum StateError {
    #[error("Dimension mismatch: expected {expected}, got {got_rows}x{got_cols}")]
    DimensionMismatch {
        expected: usize,
        got_rows: usize,
        got_cols: usize,
    },

    #[error("Qubit index {index} out of bounds for a {num_qubits}-qubit register")]
    IndexOutOfBounds { index: usize, num_qubits: usize },

    #[error("Sampled a measurement outcome with vanishing probability")]
    VanishingOutcome,

    #[error("Measurement error: {0}")]
    MeasurementError(#[from] MeasurementError),

    #[error("Gate error: {0}")]
    GateError(#[from] GateError),

    #[error("Noise error: {0}")]
    NoiseError(#[from] NoiseError),
}

/// Failures reported by a quantum link.
///
/// Only [`LinkError::ResourceUnavailable`] is transient; a party retries it
/// locally and never reports it upwards.
#[derive(Error, Debug, Clone)]
pub enum LinkError {
    #[error("no qubit available on node {node}")]
    ResourceUnavailable { node: String },

    #[error("node {from} has no quantum link to {to}")]
    NotAdjacent { from: String, to: String },

    #[error("unknown node {0}")]
    UnknownNode(String),

    #[error("link of node {node} is disconnected")]
    Disconnected { node: String },

    #[error("no qubit arrived at {node} within {waited:?}")]
    Timeout { node: String, waited: Duration },

    #[error("run cancelled")]
    Cancelled,

    #[error("backend failure: {0}")]
    Backend(#[from] StateError),
}

impl LinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LinkError::ResourceUnavailable { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BarrierError {
    #[error("round {round}: parties {missing:?} never arrived at the barrier")]
    Timeout { round: u64, missing: Vec<usize> },

    #[error("barrier aborted")]
    Aborted,

    #[error("party index {index} is not registered (barrier has {parties} parties)")]
    UnknownParty { index: usize, parties: usize },

    #[error("party {index} arrived twice in round {round}")]
    DuplicateArrival { index: usize, round: u64 },
}

/// Errors raised by a single party task.
#[derive(Error, Debug, Clone)]
pub enum PartyError {
    #[error("round {round}: {source}")]
    Barrier { round: usize, source: BarrierError },

    #[error("round {round}: {source}")]
    Link { round: usize, source: LinkError },
}

impl PartyError {
    /// True for failures that only echo another party's cancellation.
    pub fn is_secondary(&self) -> bool {
        matches!(
            self,
            PartyError::Barrier {
                source: BarrierError::Aborted,
                ..
            } | PartyError::Link {
                source: LinkError::Cancelled,
                ..
            }
        )
    }

    pub fn round(&self) -> usize {
        match self {
            PartyError::Barrier { round, .. } | PartyError::Link { round, .. } => *round,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("buffers are misaligned: {left} rounds vs {right} rounds")]
    Alignment { left: usize, right: usize },

    #[error("round index mismatch at position {position}: {left} vs {right}")]
    RoundMismatch {
        position: usize,
        left: usize,
        right: usize,
    },

    #[error("resource mismatch in round {round}: {left} vs {right}")]
    ResourceMismatch { round: usize, left: u64, right: u64 },

    #[error("round {round} has no {field}")]
    Incomplete { round: usize, field: &'static str },

    #[error("domain error: {0}")]
    Domain(String),

    #[error("insufficient data: {available} samples available, {required} required")]
    InsufficientData { available: usize, required: usize },

    #[error("min-entropy {min_entropy} does not exceed 2*log2(1/epsilon) = {required}")]
    InsufficientEntropy { min_entropy: f64, required: f64 },

    #[error("seed has {seed} bits, at least {required} are required")]
    InvalidSeedLength { seed: usize, required: usize },
}

#[derive(Error, Debug, Clone)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("round {round}: parties {missing:?} never arrived at the barrier")]
    BarrierTimeout { round: u64, missing: Vec<String> },

    #[error("party {party} failed in round {round}: {source}")]
    ChannelFailure {
        party: String,
        round: usize,
        source: LinkError,
    },

    #[error("party {party} stopped in round {round}: {source}")]
    Aborted {
        party: String,
        round: usize,
        source: BarrierError,
    },

    #[error("party {party} panicked")]
    PartyPanicked { party: String },
}

#[derive(Error, Debug, Clone)]
pub enum ExperimentError {
    #[error("run failed: {0}")]
    Run(#[from] RunError),

    #[error("statistics failed: {0}")]
    Stats(#[from] StatsError),

    #[error("party {0} is missing from the run results")]
    MissingParty(String),
}
