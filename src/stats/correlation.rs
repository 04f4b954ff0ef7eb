use std::collections::HashSet;

use tracing::warn;

use crate::errors::StatsError;
use crate::record::ResultBuffer;

/// Measurement settings and outcomes of one party, index-aligned by round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartyData {
    pub settings: Vec<u8>,
    pub outcomes: Vec<u8>,
}

impl PartyData {
    /// Reads settings and outcomes out of a complete buffer.
    pub fn from_buffer<B>(buffer: &ResultBuffer<B>) -> Result<Self, StatsError> {
        if !buffer.is_complete() {
            return Err(StatsError::Incomplete {
                round: buffer.len(),
                field: "record",
            });
        }

        let mut data = PartyData {
            settings: Vec::with_capacity(buffer.len()),
            outcomes: Vec::with_capacity(buffer.len()),
        };
        for record in buffer.records() {
            let choice = record.chosen_basis.as_ref().ok_or(StatsError::Incomplete {
                round: record.round_index,
                field: "basis",
            })?;
            let outcome = record.outcome.ok_or(StatsError::Incomplete {
                round: record.round_index,
                field: "outcome",
            })?;
            data.settings.push(choice.setting);
            data.outcomes.push(outcome);
        }
        Ok(data)
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}

fn check_lengths(expected: usize, lengths: impl IntoIterator<Item = usize>) -> Result<(), StatsError> {
    match lengths.into_iter().find(|&len| len != expected) {
        Some(len) => Err(StatsError::Alignment {
            left: expected,
            right: len,
        }),
        None => Ok(()),
    }
}

/// CHSH correlation of two parties with binary settings and outcomes.
///
/// Each round contributes (-1)^(x*y) * (+1 if the outcomes agree, else -1),
/// divided by 1/4, the probability of a setting pair; the mean over rounds
/// estimates the CHSH value, with 2*sqrt(2) the quantum maximum.
pub fn estimate_bipartite_correlation(a: &PartyData, b: &PartyData) -> Result<f64, StatsError> {
    let n = a.len();
    check_lengths(n, [a.outcomes.len(), b.settings.len(), b.outcomes.len()])?;
    if n == 0 {
        return Err(StatsError::InsufficientData {
            available: 0,
            required: 1,
        });
    }

    let mut total = 0.0;
    for i in 0..n {
        let (x, y) = (a.settings[i], b.settings[i]);
        if x > 1 || y > 1 {
            return Err(StatsError::Domain(format!(
                "round {i}: settings ({x}, {y}) are not binary"
            )));
        }
        let sign = if x & y == 1 { -1.0 } else { 1.0 };
        let agreement = if a.outcomes[i] == b.outcomes[i] { 1.0 } else { -1.0 };
        total += sign * agreement / 0.25;
    }

    Ok(total / n as f64)
}

/// Two reference sets of per-party bit patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSets {
    u0: HashSet<Vec<u8>>,
    u1: HashSet<Vec<u8>>,
    width: usize,
}

impl PatternSets {
    /// Builds the sets, all patterns must have the same width.
    ///
    /// Overlapping sets are accepted but logged, since they make the
    /// estimator count rounds that carry no violation.
    pub fn new(u0: Vec<Vec<u8>>, u1: Vec<Vec<u8>>) -> Result<Self, StatsError> {
        let width = u0
            .first()
            .or(u1.first())
            .map(Vec::len)
            .ok_or_else(|| StatsError::Domain("reference sets are empty".into()))?;

        if let Some(bad) = u0.iter().chain(&u1).find(|p| p.len() != width) {
            return Err(StatsError::Domain(format!(
                "pattern {bad:?} does not have width {width}"
            )));
        }

        let sets = Self {
            u0: u0.into_iter().collect(),
            u1: u1.into_iter().collect(),
            width,
        };

        if sets.is_identical() {
            warn!(width, "Reference pattern sets are identical; the estimate is meaningless");
        } else if sets.u0.intersection(&sets.u1).next().is_some() {
            warn!(width, "Reference pattern sets overlap");
        }
        Ok(sets)
    }

    /// U0 holds the single-excitation patterns, U1 their bitwise complements.
    pub fn single_excitation(parties: usize) -> Result<Self, StatsError> {
        let unit = |i: usize| (0..parties).map(|p| u8::from(p == i)).collect::<Vec<u8>>();
        let u0 = (0..parties).map(unit).collect::<Vec<_>>();
        let u1 = u0
            .iter()
            .map(|p| p.iter().map(|b| 1 - b).collect())
            .collect();
        Self::new(u0, u1)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// True when both sets hold the same patterns.
    pub fn is_identical(&self) -> bool {
        self.u0 == self.u1
    }
}

/// Fraction of rounds whose settings lie in one reference set while the
/// outcomes lie in the other.
///
/// `parties[p]` holds party p's data; every party must cover the same rounds.
pub fn estimate_multipartite_correlation(
    parties: &[PartyData],
    patterns: &PatternSets,
) -> Result<f64, StatsError> {
    if parties.len() != patterns.width() {
        return Err(StatsError::Domain(format!(
            "{} parties but patterns of width {}",
            parties.len(),
            patterns.width()
        )));
    }
    let n = parties.first().map(PartyData::len).unwrap_or_default();
    check_lengths(
        n,
        parties
            .iter()
            .flat_map(|p| [p.settings.len(), p.outcomes.len()]),
    )?;
    if n == 0 {
        return Err(StatsError::InsufficientData {
            available: 0,
            required: 1,
        });
    }

    let mut hits = 0usize;
    let mut u = vec![0u8; parties.len()];
    let mut x = vec![0u8; parties.len()];
    for round in 0..n {
        for (p, data) in parties.iter().enumerate() {
            u[p] = data.settings[round];
            x[p] = data.outcomes[round];
        }
        let hit = if patterns.u0.contains(&u) {
            patterns.u1.contains(&x)
        } else if patterns.u1.contains(&u) {
            patterns.u0.contains(&x)
        } else {
            false
        };
        hits += usize::from(hit);
    }

    Ok(hits as f64 / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn data(settings: &[u8], outcomes: &[u8]) -> PartyData {
        PartyData {
            settings: settings.to_vec(),
            outcomes: outcomes.to_vec(),
        }
    }

    #[test]
    fn perfect_classical_strategy_reaches_two() {
        // always agree: +4 for three setting pairs, -4 for (1, 1)
        let settings_a = [0, 0, 1, 1];
        let settings_b = [0, 1, 0, 1];
        let outcomes = [0, 1, 1, 0];
        let i = estimate_bipartite_correlation(
            &data(&settings_a, &outcomes),
            &data(&settings_b, &outcomes),
        )
        .unwrap();
        assert!((i - 2.0).abs() < 1e-12);
    }

    #[test]
    fn anticorrelated_outcomes_flip_the_sign() {
        let i = estimate_bipartite_correlation(&data(&[0, 0], &[0, 1]), &data(&[0, 0], &[1, 0])).unwrap();
        assert!((i + 4.0).abs() < 1e-12);
    }

    #[test]
    fn bipartite_rejects_bad_input() {
        assert!(matches!(
            estimate_bipartite_correlation(&data(&[0, 1], &[0, 1]), &data(&[0], &[0])),
            Err(StatsError::Alignment { left: 2, right: 1 })
        ));
        assert!(matches!(
            estimate_bipartite_correlation(&PartyData::default(), &PartyData::default()),
            Err(StatsError::InsufficientData { .. })
        ));
        assert!(matches!(
            estimate_bipartite_correlation(&data(&[2], &[0]), &data(&[0], &[0])),
            Err(StatsError::Domain(_))
        ));
    }

    #[test]
    fn single_excitation_sets_are_complements() {
        let sets = PatternSets::single_excitation(4).unwrap();
        assert!(sets.u0.contains(&vec![0, 1, 0, 0]));
        assert!(sets.u1.contains(&vec![1, 0, 1, 1]));
        assert!(!sets.is_identical());
    }

    #[test]
    fn counts_cross_set_rounds() {
        let sets = PatternSets::single_excitation(2).unwrap();
        // U0 = {10, 01}, U1 = {01, 10}: identical as sets for two parties
        assert!(sets.is_identical());

        let sets = PatternSets::new(vec![vec![0, 0]], vec![vec![1, 1]]).unwrap();
        let a = data(&[0, 1, 0, 1], &[1, 0, 0, 0]);
        let b = data(&[0, 1, 0, 0], &[1, 0, 1, 1]);
        // round 0: u=00 in U0, x=11 in U1; round 1: u=11 in U1, x=00 in U0
        // round 2: x=01 misses; round 3: u=10 in neither
        let estimate = estimate_multipartite_correlation(&[a, b], &sets).unwrap();
        assert!((estimate - 0.5).abs() < 1e-12);
    }

    #[test]
    #[traced_test]
    fn identical_reference_sets_are_flagged() {
        let sets = PatternSets::new(vec![vec![1, 0, 0]], vec![vec![1, 0, 0]]).unwrap();
        assert!(sets.is_identical());
        assert!(logs_contain("identical"));
    }

    #[test]
    fn multipartite_rejects_mismatched_width() {
        let sets = PatternSets::single_excitation(3).unwrap();
        let one = data(&[0], &[0]);
        assert!(matches!(
            estimate_multipartite_correlation(&[one.clone(), one], &sets),
            Err(StatsError::Domain(_))
        ));
        assert!(PatternSets::new(vec![vec![0, 1]], vec![vec![1]]).is_err());
    }
}
