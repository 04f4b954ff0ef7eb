use crate::core::Gate;
use crate::core::measurements::{Measurement, MeasurementResult};
use crate::core::noise::NoiseChannel;
use crate::core::utils::{find_duplicate, sandwich, trace};
use crate::errors::{MeasurementError, NoiseError, StateError};
use ndarray::Array2;
use num_complex::Complex64;
use rand::Rng;

/// Density matrix of a small qubit register.
#[derive(Clone, Debug)]
pub struct QuantumState {
    pub density_matrix: Array2<Complex64>,
    pub num_qubits: usize,
}

impl QuantumState {
    /// Creates a new quantum state initialized to |0...0>.
    pub fn new(num_qubits: usize) -> Self {
        let dim = 1 << num_qubits;
        let mut density_matrix = Array2::<Complex64>::zeros((dim, dim));
        density_matrix[[0, 0]] = Complex64::new(1.0, 0.0);

        Self {
            density_matrix,
            num_qubits,
        }
    }

    fn validate_qubits(&self, qubits: &[usize]) -> Result<(), StateError> {
        match qubits.iter().find(|&&q| q >= self.num_qubits) {
            Some(&index) => Err(StateError::IndexOutOfBounds {
                index,
                num_qubits: self.num_qubits,
            }),
            None => Ok(()),
        }
    }

    /// Applies non controlled quantum gate
    pub fn apply(&mut self, gate: &Gate, target_qubits: &[usize]) -> Result<(), StateError> {
        self.apply_controlled(gate, target_qubits, &[])
    }

    /// Applies `gate` to `target_qubits`, conditioned on every control being 1.
    pub fn apply_controlled(
        &mut self,
        gate: &Gate,
        target_qubits: &[usize],
        control_qubits: &[usize],
    ) -> Result<(), StateError> {
        if gate.num_qubits != target_qubits.len() {
            return Err(StateError::DimensionMismatch {
                expected: gate.num_qubits,
                got_rows: target_qubits.len(),
                got_cols: 0,
            });
        }

        self.validate_qubits(target_qubits)?;
        self.validate_qubits(control_qubits)?;

        let full = Gate::expand_gate(self.num_qubits, gate, target_qubits, control_qubits)?;
        self.density_matrix = sandwich(&full.matrix, &self.density_matrix);
        Ok(())
    }

    /// Outcome probabilities and the expanded operators of a measurement.
    pub fn outcome_probabilities(
        &self,
        measurement: &Measurement,
        target_qubits: &[usize],
    ) -> Result<(Vec<f64>, Vec<Array2<Complex64>>), StateError> {
        self.validate_qubits(target_qubits)?;

        if let Some(dup) = find_duplicate(target_qubits) {
            return Err(MeasurementError::DuplicateQubit(dup).into());
        }

        let expanded_ops = measurement.get_expanded_operators(self.num_qubits, target_qubits)?;

        let mut probs: Vec<f64> = expanded_ops
            .iter()
            .map(|op| trace(&sandwich(op, &self.density_matrix)).re.max(0.0))
            .collect();

        // renormalise away floating point drift
        let total: f64 = probs.iter().sum();
        for p in &mut probs {
            *p /= total;
        }

        Ok((probs, expanded_ops))
    }

    /// Projective measurement; collapses the register.
    ///
    /// The outcome is sampled from `rng`, so a seeded generator reproduces the
    /// same sequence of outcomes.
    pub fn measure<R: Rng + ?Sized>(
        &mut self,
        measurement: &Measurement,
        target_qubits: &[usize],
        rng: &mut R,
    ) -> Result<MeasurementResult, StateError> {
        let (probs, ops) = self.outcome_probabilities(measurement, target_qubits)?;

        let roll: f64 = rng.random();
        let mut cumulative = 0.0;
        let outcome_idx = probs
            .iter()
            .position(|&p| {
                cumulative += p;
                roll < cumulative
            })
            .unwrap_or(probs.len() - 1);

        let p_selected = probs[outcome_idx];
        if p_selected <= 1e-12 {
            return Err(StateError::VanishingOutcome);
        }

        // rho' = (M_k rho M_k†) / p_k
        let numerator = sandwich(&ops[outcome_idx], &self.density_matrix);
        self.density_matrix = numerator.mapv(|val| val / p_selected);

        Ok(MeasurementResult {
            index: outcome_idx,
            value: measurement.values[outcome_idx],
        })
    }

    /// Applies a noise channel to `target_qubits`.
    pub fn apply_noise(
        &mut self,
        channel: &NoiseChannel,
        target_qubits: &[usize],
    ) -> Result<(), StateError> {
        if let Some(dup) = find_duplicate(target_qubits) {
            return Err(NoiseError::DuplicateQubit(dup).into());
        }
        self.validate_qubits(target_qubits)?;

        let dim = self.density_matrix.nrows();
        self.density_matrix = channel
            .get_expanded_operators(self.num_qubits, target_qubits)?
            .iter()
            .fold(Array2::<Complex64>::zeros((dim, dim)), |acc, k| {
                acc + sandwich(k, &self.density_matrix)
            });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn bell_pair() -> QuantumState {
        let mut state = QuantumState::new(2);
        state.apply(&Gate::h(), &[0]).unwrap();
        state.apply_controlled(&Gate::x(), &[1], &[0]).unwrap();
        state
    }

    #[test]
    fn x_flips_computational_outcome() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut state = QuantumState::new(1);
        state.apply(&Gate::x(), &[0]).unwrap();
        let result = state.measure(&Measurement::z_basis(), &[0], &mut rng).unwrap();
        assert_eq!(result.value, 1);
    }

    #[test]
    fn bell_pair_outcomes_agree() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..50 {
            let mut state = bell_pair();
            let a = state.measure(&Measurement::z_basis(), &[0], &mut rng).unwrap();
            let b = state.measure(&Measurement::z_basis(), &[1], &mut rng).unwrap();
            assert_eq!(a.value, b.value);
        }
    }

    #[test]
    fn hadamard_gives_even_probabilities() {
        let mut state = QuantumState::new(1);
        state.apply(&Gate::h(), &[0]).unwrap();
        let (probs, _) = state.outcome_probabilities(&Measurement::z_basis(), &[0]).unwrap();
        assert!((probs[0] - 0.5).abs() < 1e-12);
        assert!((probs[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn full_bit_flip_noise_flips_outcome() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut state = QuantumState::new(1);
        state.apply_noise(&NoiseChannel::bit_flip(1.0).unwrap(), &[0]).unwrap();
        let result = state.measure(&Measurement::z_basis(), &[0], &mut rng).unwrap();
        assert_eq!(result.value, 1);
    }

    #[test]
    fn out_of_range_qubit_is_rejected() {
        let mut state = QuantumState::new(1);
        let err = state.apply(&Gate::x(), &[3]).unwrap_err();
        assert!(matches!(err, StateError::IndexOutOfBounds { index: 3, num_qubits: 1 }));
    }
}
