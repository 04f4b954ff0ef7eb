use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::errors::StatsError;
use crate::record::{ResultBuffer, RoundRecord};

/// A round both parties kept after basis comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SiftedRound<B> {
    pub round_index: usize,
    pub basis_a: B,
    pub basis_b: B,
    pub bit_a: u8,
    pub bit_b: u8,
}

impl<B> SiftedRound<B> {
    pub fn agrees(&self) -> bool {
        self.bit_a == self.bit_b
    }
}

/// Rounds kept by sifting, in round order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiftedKey<B> {
    rounds: Vec<SiftedRound<B>>,
}

impl<B: Copy> SiftedKey<B> {
    pub fn new(rounds: Vec<SiftedRound<B>>) -> Self {
        Self { rounds }
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn rounds(&self) -> &[SiftedRound<B>] {
        &self.rounds
    }

    pub fn bits_a(&self) -> Vec<bool> {
        self.rounds.iter().map(|r| r.bit_a == 1).collect()
    }

    pub fn bits_b(&self) -> Vec<bool> {
        self.rounds.iter().map(|r| r.bit_b == 1).collect()
    }

    pub fn disagreements(&self) -> usize {
        self.rounds.iter().filter(|r| !r.agrees()).count()
    }

    /// Keeps the rounds whose bases satisfy `keep`.
    ///
    /// Sifting an already sifted key with the same predicate changes nothing.
    pub fn sift<P>(&self, keep: P) -> SiftedKey<B>
    where
        P: Fn(&B, &B) -> bool,
    {
        Self::new(
            self.rounds
                .iter()
                .filter(|r| keep(&r.basis_a, &r.basis_b))
                .copied()
                .collect(),
        )
    }
}

fn basis_and_bit<B: Copy>(record: &RoundRecord<B>) -> Result<(B, u8), StatsError> {
    let basis = record.chosen_basis.ok_or(StatsError::Incomplete {
        round: record.round_index,
        field: "basis",
    })?;
    let bit = record.outcome.ok_or(StatsError::Incomplete {
        round: record.round_index,
        field: "outcome",
    })?;
    Ok((basis.basis, bit))
}

/// Checks that two buffers are complete and cover the same rounds.
pub fn check_alignment<B>(a: &ResultBuffer<B>, b: &ResultBuffer<B>) -> Result<(), StatsError> {
    if a.len() != b.len() {
        return Err(StatsError::Alignment {
            left: a.len(),
            right: b.len(),
        });
    }
    for buffer in [a, b] {
        if !buffer.is_complete() {
            return Err(StatsError::Incomplete {
                round: buffer.len(),
                field: "record",
            });
        }
    }
    for (position, (ra, rb)) in a.records().iter().zip(b.records()).enumerate() {
        if ra.round_index != rb.round_index {
            return Err(StatsError::RoundMismatch {
                position,
                left: ra.round_index,
                right: rb.round_index,
            });
        }
    }
    Ok(())
}

/// Checks that two parties held qubits of the same resource every round.
pub fn check_shared_resources<B>(a: &ResultBuffer<B>, b: &ResultBuffer<B>) -> Result<(), StatsError> {
    check_alignment(a, b)?;
    for (ra, rb) in a.records().iter().zip(b.records()) {
        let missing = |field| StatsError::Incomplete {
            round: ra.round_index,
            field,
        };
        let left = ra.resource_id.ok_or_else(|| missing("resource"))?;
        let right = rb.resource_id.ok_or_else(|| missing("resource"))?;
        if left != right {
            return Err(StatsError::ResourceMismatch {
                round: ra.round_index,
                left: left.0,
                right: right.0,
            });
        }
    }
    Ok(())
}

/// Keeps the rounds where `keep` accepts both parties' bases.
pub fn sift<B, P>(a: &ResultBuffer<B>, b: &ResultBuffer<B>, keep: P) -> Result<SiftedKey<B>, StatsError>
where
    B: Copy,
    P: Fn(&B, &B) -> bool,
{
    check_alignment(a, b)?;

    let mut rounds = Vec::new();
    for (ra, rb) in a.records().iter().zip(b.records()) {
        let (basis_a, bit_a) = basis_and_bit(ra)?;
        let (basis_b, bit_b) = basis_and_bit(rb)?;
        if keep(&basis_a, &basis_b) {
            rounds.push(SiftedRound {
                round_index: ra.round_index,
                basis_a,
                basis_b,
                bit_a,
                bit_b,
            });
        }
    }
    Ok(SiftedKey::new(rounds))
}

/// Outcome of comparing a test sample of the sifted key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEstimate<B> {
    /// Fraction of disagreeing test rounds, in [0, 1]
    pub rate: f64,
    pub sampled: usize,
    pub errors: usize,
    /// Rounds left for the key, in round order
    pub remaining: SiftedKey<B>,
}

/// Estimates the error rate of a sifted key.
///
/// With a `sample_fraction` a random subset of that size is disclosed and the
/// rest is kept; without one the whole key is compared and kept.
pub fn estimate_error_rate<B, R>(
    key: &SiftedKey<B>,
    sample_fraction: Option<f64>,
    rng: &mut R,
) -> Result<ErrorEstimate<B>, StatsError>
where
    B: Copy,
    R: Rng + ?Sized,
{
    if key.is_empty() {
        return Err(StatsError::InsufficientData {
            available: 0,
            required: 1,
        });
    }

    let Some(fraction) = sample_fraction else {
        let errors = key.disagreements();
        return Ok(ErrorEstimate {
            rate: errors as f64 / key.len() as f64,
            sampled: key.len(),
            errors,
            remaining: key.clone(),
        });
    };

    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(StatsError::Domain(format!(
            "sample fraction {fraction} must be in (0, 1]"
        )));
    }

    let num_check = (key.len() as f64 * fraction).round() as usize;
    if num_check == 0 {
        return Err(StatsError::InsufficientData {
            available: key.len(),
            required: (1.0 / fraction).ceil() as usize,
        });
    }

    let mut indices: Vec<usize> = (0..key.len()).collect();
    indices.shuffle(rng);
    let mut in_sample = vec![false; key.len()];
    for &i in &indices[..num_check] {
        in_sample[i] = true;
    }

    let (sample, kept): (Vec<_>, Vec<_>) = key
        .rounds()
        .iter()
        .zip(&in_sample)
        .partition(|(_, sampled)| **sampled);

    let errors = sample.iter().filter(|(r, _)| !r.agrees()).count();

    Ok(ErrorEstimate {
        rate: errors as f64 / num_check as f64,
        sampled: num_check,
        errors,
        remaining: SiftedKey::new(kept.into_iter().map(|(r, _)| *r).collect()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::Bb84Basis::{self, Computational as Z, Hadamard as X};
    use crate::record::{BasisChoice, ResourceId};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn buffer(name: &str, rounds: &[(Bb84Basis, u8)]) -> ResultBuffer<Bb84Basis> {
        let mut buffer = ResultBuffer::new(name, rounds.len());
        for (i, &(basis, bit)) in rounds.iter().enumerate() {
            buffer.push(RoundRecord {
                round_index: i,
                chosen_basis: Some(BasisChoice {
                    setting: (basis == X) as u8,
                    basis,
                }),
                outcome: Some(bit),
                resource_id: Some(ResourceId(i as u64)),
            });
        }
        buffer
    }

    fn same_basis(a: &Bb84Basis, b: &Bb84Basis) -> bool {
        a == b
    }

    #[test]
    fn keeps_matching_bases_in_order() {
        let alice = buffer("alice", &[(Z, 0), (X, 1), (Z, 1), (X, 0)]);
        let bob = buffer("bob", &[(Z, 0), (Z, 1), (Z, 0), (X, 0)]);

        let key = sift(&alice, &bob, same_basis).unwrap();
        let kept: Vec<usize> = key.rounds().iter().map(|r| r.round_index).collect();
        assert_eq!(kept, vec![0, 2, 3]);
        assert_eq!(key.disagreements(), 1);
        assert_eq!(key.bits_a(), vec![false, true, false]);
    }

    #[test]
    fn resifting_is_idempotent() {
        let alice = buffer("alice", &[(Z, 0), (X, 1), (Z, 1), (X, 0), (X, 1)]);
        let bob = buffer("bob", &[(Z, 0), (Z, 1), (X, 0), (X, 0), (X, 1)]);

        let key = sift(&alice, &bob, same_basis).unwrap();
        assert_eq!(key.sift(same_basis), key);
    }

    #[test]
    fn rejects_misaligned_buffers() {
        let alice = buffer("alice", &[(Z, 0), (X, 1)]);
        let bob = buffer("bob", &[(Z, 0)]);
        assert_eq!(
            sift(&alice, &bob, same_basis),
            Err(StatsError::Alignment { left: 2, right: 1 })
        );
    }

    #[test]
    fn rejects_incomplete_buffers() {
        let alice = buffer("alice", &[(Z, 0)]);
        let bob = ResultBuffer::new("bob", 1);
        assert!(matches!(
            sift(&alice, &bob, same_basis),
            Err(StatsError::Alignment { .. })
        ));

        let mut partial = ResultBuffer::new("bob", 2);
        partial.push(alice.records()[0].clone());
        let longer = buffer("alice", &[(Z, 0)]);
        assert!(matches!(
            check_alignment(&longer, &partial),
            Err(StatsError::Incomplete { field: "record", .. })
        ));
    }

    #[test]
    fn full_key_comparison_counts_every_error() {
        let alice = buffer("alice", &[(Z, 0), (Z, 1), (Z, 1), (Z, 0)]);
        let bob = buffer("bob", &[(Z, 0), (Z, 0), (Z, 1), (Z, 0)]);
        let key = sift(&alice, &bob, same_basis).unwrap();

        let estimate = estimate_error_rate(&key, None, &mut ChaCha8Rng::seed_from_u64(0)).unwrap();
        assert_eq!(estimate.errors, 1);
        assert!((estimate.rate - 0.25).abs() < 1e-12);
        assert_eq!(estimate.remaining, key);
    }

    #[test]
    fn error_rate_is_one_when_every_bit_differs() {
        let rounds: Vec<(Bb84Basis, u8)> = (0..24).map(|i| (X, (i % 2) as u8)).collect();
        let flipped: Vec<(Bb84Basis, u8)> = rounds.iter().map(|&(b, bit)| (b, 1 - bit)).collect();
        let key = sift(&buffer("alice", &rounds), &buffer("bob", &flipped), same_basis).unwrap();

        let full = estimate_error_rate(&key, None, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        assert_eq!(full.rate, 1.0);
        assert_eq!(full.errors, 24);

        let sampled = estimate_error_rate(&key, Some(0.5), &mut ChaCha8Rng::seed_from_u64(2)).unwrap();
        assert_eq!(sampled.rate, 1.0);
        assert_eq!(sampled.sampled, 12);
    }

    #[test]
    fn sampling_partitions_the_key() {
        let rounds: Vec<(Bb84Basis, u8)> = (0..40).map(|i| (Z, (i % 2) as u8)).collect();
        let alice = buffer("alice", &rounds);
        let bob = buffer("bob", &rounds);
        let key = sift(&alice, &bob, same_basis).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let estimate = estimate_error_rate(&key, Some(0.25), &mut rng).unwrap();
        assert_eq!(estimate.sampled, 10);
        assert_eq!(estimate.remaining.len(), 30);
        assert_eq!(estimate.rate, 0.0);
        let order: Vec<usize> = estimate.remaining.rounds().iter().map(|r| r.round_index).collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn empty_or_unsampled_keys_are_insufficient() {
        let empty: SiftedKey<Bb84Basis> = SiftedKey::new(Vec::new());
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            estimate_error_rate(&empty, None, &mut rng),
            Err(StatsError::InsufficientData { available: 0, .. })
        ));

        let alice = buffer("alice", &[(Z, 0), (Z, 1)]);
        let key = sift(&alice, &alice, same_basis).unwrap();
        assert!(matches!(
            estimate_error_rate(&key, Some(0.1), &mut rng),
            Err(StatsError::InsufficientData { available: 2, .. })
        ));
        assert!(matches!(
            estimate_error_rate(&key, Some(1.5), &mut rng),
            Err(StatsError::Domain(_))
        ));
    }

    #[test]
    fn detects_resource_mismatch() {
        let alice = buffer("alice", &[(Z, 0), (Z, 1)]);
        let mut bob = ResultBuffer::new("bob", 2);
        for (i, record) in alice.records().iter().enumerate() {
            let mut record = record.clone();
            record.resource_id = Some(ResourceId(10 + i as u64));
            bob.push(record);
        }
        assert_eq!(
            check_shared_resources(&alice, &bob),
            Err(StatsError::ResourceMismatch {
                round: 0,
                left: 0,
                right: 10
            })
        );
        assert_eq!(check_shared_resources(&alice, &alice), Ok(()));
    }
}
