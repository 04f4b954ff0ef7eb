//! Post-processing of completed result buffers.
//!
//! Pure functions over immutable buffers: sifting, error-rate estimation,
//! Bell correlation, entropy bounds and seeded extraction.

mod correlation;
mod entropy;
mod extractor;
mod sifting;

pub use correlation::{PartyData, PatternSets, estimate_bipartite_correlation, estimate_multipartite_correlation};
pub use entropy::{TSIRELSON_BOUND, min_entropy_bound, statistical_correction};
pub use extractor::{ExtractorSeed, extract, output_length};
pub use sifting::{
    ErrorEstimate, SiftedKey, SiftedRound, check_alignment, check_shared_resources, estimate_error_rate, sift,
};

use crate::errors::StatsError;

/// Parses a string of `0`/`1` characters, ignoring whitespace.
pub fn parse_bits(text: &str) -> Result<Vec<bool>, StatsError> {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '0' => Ok(false),
            '1' => Ok(true),
            other => Err(StatsError::Domain(format!("invalid bit character {other:?}"))),
        })
        .collect()
}

/// Renders bits as a `0`/`1` string.
pub fn bit_string(bits: &[bool]) -> String {
    bits.iter().map(|&b| if b { '1' } else { '0' }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_survive_parsing_with_whitespace() {
        let bits = parse_bits("10 01\n1").unwrap();
        assert_eq!(bits, vec![true, false, false, true, true]);
        assert_eq!(bit_string(&bits), "10011");
    }

    #[test]
    fn non_binary_characters_are_rejected() {
        assert!(matches!(parse_bits("0120"), Err(StatsError::Domain(_))));
    }
}
