//! Matrix helpers shared by the density-matrix backend.
//!
//! - Operator expansion from a few target qubits to the whole register.
//! - Completeness checks for measurements and noise channels.
//! - Bit scatter/gather for basis-state indices.

use ndarray::{Array1, Array2};
use num_complex::Complex64;

/// Computes the trace of a matrix (sum of diagonal elements).
pub fn trace(matrix: &Array2<Complex64>) -> Complex64 {
    matrix.diag().sum()
}

/// Conjugate transpose.
pub fn dagger(matrix: &Array2<Complex64>) -> Array2<Complex64> {
    matrix.t().mapv(|c| c.conj())
}

/// Computes `M ρ M†`.
pub fn sandwich(op: &Array2<Complex64>, rho: &Array2<Complex64>) -> Array2<Complex64> {
    op.dot(rho).dot(&dagger(op))
}

/// Builds the full `2^n x 2^n` operator for a local matrix.
///
/// Qubit `q` is bit `q` of a basis-state index. The local `matrix` acts on
/// `targets` (its row/column bit `i` maps to `targets[i]`) whenever every
/// qubit in `controls` is 1, and as the identity otherwise.
pub fn expand_operator(
    num_total_qubits: usize,
    matrix: &Array2<Complex64>,
    targets: &[usize],
    controls: &[usize],
) -> Array2<Complex64> {
    let dim = 1 << num_total_qubits;
    let mut full_matrix = Array2::<Complex64>::zeros((dim, dim));

    let control_mask = controls.iter().fold(0usize, |mask, &c| mask | (1 << c));
    let target_mask = targets.iter().fold(0usize, |mask, &t| mask | (1 << t));
    let passive_mask = !target_mask;

    for col_idx in 0..dim {
        if (col_idx & control_mask) != control_mask {
            full_matrix[[col_idx, col_idx]] = Complex64::new(1.0, 0.0);
            continue;
        }

        let small_col = extract_bits(col_idx, targets);
        for small_row in 0..matrix.nrows() {
            let val = matrix[[small_row, small_col]];
            if val.norm_sqr() < f64::EPSILON {
                continue;
            }
            // passive bits survive, target bits are rewritten
            let row_idx = (col_idx & passive_mask) | deposit_bits(small_row, targets);
            full_matrix[[row_idx, col_idx]] = val;
        }
    }
    full_matrix
}

/// Gathers the bits of `value` at `indices` into a compact integer.
fn extract_bits(value: usize, indices: &[usize]) -> usize {
    indices
        .iter()
        .enumerate()
        .filter(|&(_, &pos)| (value >> pos) & 1 == 1)
        .fold(0, |acc, (i, _)| acc | (1 << i))
}

/// Scatters bit `i` of `compact_value` to position `indices[i]`.
fn deposit_bits(compact_value: usize, indices: &[usize]) -> usize {
    indices
        .iter()
        .enumerate()
        .filter(|&(i, _)| (compact_value >> i) & 1 == 1)
        .fold(0, |acc, (_, &pos)| acc | (1 << pos))
}

/// Find duplicate in a slice of usize
pub fn find_duplicate(indices: &[usize]) -> Option<usize> {
    let mut seen = std::collections::HashSet::new();
    indices.iter().find(|&&idx| !seen.insert(idx)).copied()
}

/// Checks the completeness relation $\sum M_k^\dagger M_k = I$.
pub fn check_completeness(ops: &[Array2<Complex64>], dim: usize) -> bool {
    let eye = Array2::<Complex64>::eye(dim);
    let sum = ops
        .iter()
        .fold(Array2::<Complex64>::zeros((dim, dim)), |acc, op| {
            acc + dagger(op).dot(op)
        });
    sum.iter()
        .zip(eye.iter())
        .all(|(a, b)| (a - b).norm() < 1e-9)
}

/// Computes the outer product $|a\rangle\langle b|$.
pub fn outer_product(a: &Array1<Complex64>, b: &Array1<Complex64>) -> Array2<Complex64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j].conj())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    #[test]
    fn expand_single_qubit_x_on_second_qubit() {
        let x = array![[c(0.0), c(1.0)], [c(1.0), c(0.0)]];
        let full = expand_operator(2, &x, &[1], &[]);

        // |00> (index 0) -> |10> (index 2, qubit 1 set)
        assert_eq!(full[[2, 0]], c(1.0));
        assert_eq!(full[[0, 2]], c(1.0));
        assert_eq!(full[[3, 1]], c(1.0));
        assert_eq!(full[[0, 0]], c(0.0));
    }

    #[test]
    fn controlled_expansion_leaves_unset_controls_alone() {
        let x = array![[c(0.0), c(1.0)], [c(1.0), c(0.0)]];
        let cnot = expand_operator(2, &x, &[1], &[0]);

        assert_eq!(cnot[[0, 0]], c(1.0));
        assert_eq!(cnot[[2, 2]], c(1.0));
        // control (bit 0) set: |01> (1) <-> |11> (3)
        assert_eq!(cnot[[3, 1]], c(1.0));
        assert_eq!(cnot[[1, 3]], c(1.0));
    }

    #[test]
    fn finds_first_duplicate() {
        assert_eq!(find_duplicate(&[0, 2, 1, 2]), Some(2));
        assert_eq!(find_duplicate(&[0, 1, 2]), None);
    }
}
