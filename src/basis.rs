//! Measurement bases and their transform tables.
//!
//! Every basis is measured the same way: apply the basis' rotation sequence
//! to the qubit, then measure in the computational basis. Preparing an
//! eigenstate runs the inverse sequence after encoding the bit with X.
//!
//! Each protocol family has its own closed enum, so a party configured with a
//! basis its protocol does not know is a type error rather than a runtime
//! lookup failure. New bases only extend a table; the party state machine
//! never inspects labels.

use std::f64::consts::{FRAC_PI_4, PI};
use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::Gate;

/// One single-qubit operation in a basis transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Rotation {
    Hadamard,
    PauliX,
    Rx(f64),
    Ry(f64),
    Rz(f64),
}

impl Rotation {
    pub fn gate(&self) -> Gate {
        match *self {
            Rotation::Hadamard => Gate::h(),
            Rotation::PauliX => Gate::x(),
            Rotation::Rx(theta) => Gate::rx(theta),
            Rotation::Ry(theta) => Gate::ry(theta),
            Rotation::Rz(theta) => Gate::rz(theta),
        }
    }

    pub fn inverse(&self) -> Rotation {
        match *self {
            Rotation::Hadamard => Rotation::Hadamard,
            Rotation::PauliX => Rotation::PauliX,
            Rotation::Rx(theta) => Rotation::Rx(-theta),
            Rotation::Ry(theta) => Rotation::Ry(-theta),
            Rotation::Rz(theta) => Rotation::Rz(-theta),
        }
    }
}

/// Sequence preparing the eigenstate selected by an already encoded bit.
pub fn preparation(measure: &[Rotation]) -> Vec<Rotation> {
    measure.iter().rev().map(Rotation::inverse).collect()
}

/// A label from a protocol's basis set.
pub trait BasisLabel:
    Copy + Eq + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Rotations taking the basis eigenstates to |0> and |1>.
    fn transform(&self) -> &'static [Rotation];

    fn label(&self) -> &'static str;
}

const IDENTITY: &[Rotation] = &[];
const HADAMARD: &[Rotation] = &[Rotation::Hadamard];
// Rz(pi) Ry(theta) Rz(pi) measures cos(theta) Z + sin(theta) X
const X_PLUS_Z: &[Rotation] = &[Rotation::Rz(PI), Rotation::Ry(FRAC_PI_4), Rotation::Rz(PI)];
const X_MINUS_Z: &[Rotation] = &[
    Rotation::Rz(PI),
    Rotation::Ry(3.0 * FRAC_PI_4),
    Rotation::Rz(PI),
];

/// Conjugate-coding bases used by BB84.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub enum Bb84Basis {
    /// {|0>, |1>}
    #[serde(rename = "Z")]
    Computational,
    /// {|+>, |->}
    #[serde(rename = "X")]
    Hadamard,
}

impl Bb84Basis {
    pub const ALL: [Bb84Basis; 2] = [Bb84Basis::Computational, Bb84Basis::Hadamard];
}

impl BasisLabel for Bb84Basis {
    fn transform(&self) -> &'static [Rotation] {
        match self {
            Bb84Basis::Computational => IDENTITY,
            Bb84Basis::Hadamard => HADAMARD,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Bb84Basis::Computational => "Z",
            Bb84Basis::Hadamard => "X",
        }
    }
}

/// Bases used by the Bell-test experiments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub enum BellBasis {
    Z,
    X,
    /// (X + Z) / sqrt(2)
    #[serde(rename = "X+Z")]
    XPlusZ,
    /// (X - Z) / sqrt(2)
    #[serde(rename = "X-Z")]
    XMinusZ,
}

impl BasisLabel for BellBasis {
    fn transform(&self) -> &'static [Rotation] {
        match self {
            BellBasis::Z => IDENTITY,
            BellBasis::X => HADAMARD,
            BellBasis::XPlusZ => X_PLUS_Z,
            BellBasis::XMinusZ => X_MINUS_Z,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            BellBasis::Z => "Z",
            BellBasis::X => "X",
            BellBasis::XPlusZ => "X+Z",
            BellBasis::XMinusZ => "X-Z",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Measurement, QuantumState};

    fn probability_of_zero(ops: &[Rotation], prepare: &[Rotation]) -> f64 {
        let mut state = QuantumState::new(1);
        for op in prepare.iter().chain(ops) {
            state.apply(&op.gate(), &[0]).unwrap();
        }
        let (probs, _) = state.outcome_probabilities(&Measurement::z_basis(), &[0]).unwrap();
        probs[0]
    }

    #[test]
    fn prepared_eigenstates_measure_deterministically() {
        for basis in [BellBasis::Z, BellBasis::X, BellBasis::XPlusZ, BellBasis::XMinusZ] {
            let prep = preparation(basis.transform());
            let p0 = probability_of_zero(basis.transform(), &prep);
            assert!((p0 - 1.0).abs() < 1e-9, "{} eigenstate leaked: {p0}", basis.label());
        }
    }

    #[test]
    fn diagonal_bases_split_computational_state_unevenly() {
        // <0| (X+Z)/sqrt(2) |0> = 1/sqrt(2), so P(0) = (1 + 1/sqrt(2)) / 2
        let expected = (1.0 + 1.0 / 2.0_f64.sqrt()) / 2.0;
        let p_plus = probability_of_zero(BellBasis::XPlusZ.transform(), &[]);
        let p_minus = probability_of_zero(BellBasis::XMinusZ.transform(), &[]);
        assert!((p_plus - expected).abs() < 1e-9);
        assert!((p_minus - (1.0 - expected)).abs() < 1e-9);
    }

    #[test]
    fn bb84_labels_round_trip_through_serde() {
        let parsed: Vec<Bb84Basis> = serde_json::from_str(r#"["Z", "X"]"#).unwrap();
        assert_eq!(parsed, Bb84Basis::ALL.to_vec());
    }
}
