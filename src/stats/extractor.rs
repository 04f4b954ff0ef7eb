use rand::Rng;

use crate::errors::StatsError;

/// Uniform seed bits for one extraction.
///
/// Not `Clone`: [`extract`] takes the seed by value so it cannot be reused.
#[derive(Debug, PartialEq, Eq)]
pub struct ExtractorSeed {
    bits: Vec<bool>,
}

impl ExtractorSeed {
    pub fn new(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    pub fn random<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        Self::new((0..len).map(|_| rng.random_bool(0.5)).collect())
    }

    /// Parses a string of `0`/`1` characters, ignoring whitespace.
    pub fn parse(text: &str) -> Result<Self, StatsError> {
        super::parse_bits(text).map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

/// Length of the extractor output for min-entropy `k` and error `epsilon`.
pub fn output_length(min_entropy: f64, epsilon: f64) -> Result<usize, StatsError> {
    if !(epsilon > 0.0 && epsilon < 1.0) {
        return Err(StatsError::Domain(format!("epsilon {epsilon} must be in (0, 1)")));
    }
    let required = 2.0 * (1.0 / epsilon).log2();
    let m = (min_entropy - required).floor();
    if !min_entropy.is_finite() || min_entropy <= required || m < 1.0 {
        return Err(StatsError::InsufficientEntropy {
            min_entropy,
            required,
        });
    }
    Ok(m as usize)
}

/// Strong seeded extractor in the Carter-Wegman style.
///
/// The first half of the seed selects `a`, the second half `b`, and each
/// source bit `x` maps to `(a AND x) XOR b`; the first
/// `floor(k - 2 log2(1/epsilon))` bits are kept. The seed must be at least
/// twice as long as the source.
pub fn extract(
    source: &[bool],
    seed: ExtractorSeed,
    min_entropy: f64,
    epsilon: f64,
) -> Result<Vec<bool>, StatsError> {
    let n = source.len();
    let m = output_length(min_entropy, epsilon)?;

    if seed.len() < 2 * n {
        return Err(StatsError::InvalidSeedLength {
            seed: seed.len(),
            required: 2 * n,
        });
    }
    if m > n {
        return Err(StatsError::Domain(format!(
            "min-entropy {min_entropy} exceeds the {n} source bits"
        )));
    }

    let (a, b) = seed.bits.split_at(n);
    Ok(source
        .iter()
        .zip(a)
        .zip(b)
        .take(m)
        .map(|((&x, &a), &b)| (a && x) ^ b)
        .collect())
}
