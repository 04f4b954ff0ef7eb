use std::f64::consts::SQRT_2;

use crate::errors::StatsError;

/// Largest CHSH value quantum mechanics allows.
pub const TSIRELSON_BOUND: f64 = 2.0 * SQRT_2;

/// Finite-statistics correction subtracted from a measured CHSH value.
///
/// `4 * sqrt(-(1/n) * (2 + sqrt 2) * ln(1 - confidence))` for `n` rounds at
/// confidence level `confidence` in (0, 1).
pub fn statistical_correction(n_rounds: usize, confidence: f64) -> Result<f64, StatsError> {
    if n_rounds == 0 {
        return Err(StatsError::Domain("correction needs at least one round".into()));
    }
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(StatsError::Domain(format!(
            "confidence {confidence} must be in (0, 1)"
        )));
    }

    let n = n_rounds as f64;
    Ok(4.0 * (-(1.0 / n) * (2.0 + SQRT_2) * (1.0 - confidence).ln()).sqrt())
}

/// Lower bound on the min-entropy of `n_rounds` outputs given a CHSH value.
///
/// Uses the corrected value `x = correlation - correction` in
/// `n * (1 - log2(1 + sqrt(2 - x^2 / 4)))`, clamped at zero. The radicand is
/// clamped too, so a finite-sample estimate at or past the Tsirelson bound
/// certifies one bit per round.
pub fn min_entropy_bound(n_rounds: usize, correlation: f64, correction: f64) -> Result<f64, StatsError> {
    if n_rounds == 0 {
        return Err(StatsError::Domain("bound needs at least one round".into()));
    }
    if !correlation.is_finite() || !correction.is_finite() {
        return Err(StatsError::Domain("correlation and correction must be finite".into()));
    }

    let x = correlation - correction;
    let radicand = (2.0 - x * x / 4.0).max(0.0);
    let per_round = 1.0 - (1.0 + radicand.sqrt()).log2();
    Ok((n_rounds as f64 * per_round).max(0.0))
}
