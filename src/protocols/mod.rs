//! Experiments built on the coordinator and the statistics engine.
//!
//! - **BB84**: prepare-and-measure key distribution with an optional
//!   intercept-resend eavesdropper.
//! - **Certified expansion**: CHSH-certified randomness with seeded extraction.
//! - **Amplification**: four-party pattern estimator.
//! - **Polarisation**: single-source generator measuring weakly emitted
//!   photons through a diagonal filter.

pub mod amplification;
pub mod bb84;
pub mod certified_expansion;
pub mod polarisation;

use serde::{Deserialize, Serialize};

use crate::coordinator::RunResults;
use crate::errors::ExperimentError;
use crate::record::ResultBuffer;
use crate::stats::ExtractorSeed;

pub use amplification::{AmplificationConfig, AmplificationReport};
pub use bb84::{Bb84Config, Bb84Report};
pub use certified_expansion::{CertifiedExpansionConfig, CertifiedExpansionReport};
pub use polarisation::{PolarisationConfig, PolarisationReport};

pub(crate) fn party_buffer<'a, B>(
    results: &'a RunResults<B>,
    party: &str,
) -> Result<&'a ResultBuffer<B>, ExperimentError> {
    results
        .get(party)
        .ok_or_else(|| ExperimentError::MissingParty(party.to_string()))
}

/// An experiment description, as read from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum Experiment {
    Bb84(Bb84Config),
    CertifiedExpansion(CertifiedExpansionConfig),
    Amplification(AmplificationConfig),
    Polarisation(PolarisationConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum ExperimentReport {
    Bb84(Bb84Report),
    CertifiedExpansion(CertifiedExpansionReport),
    Amplification(AmplificationReport),
    Polarisation(PolarisationReport),
}

impl Experiment {
    /// Runs the experiment; `seed` is only consumed by certified expansion.
    pub fn run(&self, seed: Option<ExtractorSeed>) -> Result<ExperimentReport, ExperimentError> {
        Ok(match self {
            Experiment::Bb84(config) => ExperimentReport::Bb84(bb84::run(config)?),
            Experiment::CertifiedExpansion(config) => {
                ExperimentReport::CertifiedExpansion(certified_expansion::run(config, seed)?)
            }
            Experiment::Amplification(config) => ExperimentReport::Amplification(amplification::run(config)?),
            Experiment::Polarisation(config) => ExperimentReport::Polarisation(polarisation::run(config)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn experiment_reads_from_toml() {
        let experiment: Experiment = toml::from_str(
            r#"
            protocol = "bb84"
            intercept = true

            [run]
            rounds = 64
            seed = 5

            [link]
            noise = { kind = "bit_flip", p = 0.02 }

            [analysis]
            sample_fraction = 0.5
            "#,
        )
        .unwrap();

        let Experiment::Bb84(config) = experiment else {
            panic!("expected a BB84 experiment");
        };
        assert!(config.intercept);
        assert_eq!(config.run.rounds, 64);
        assert_eq!(config.run.seed, Some(5));
        assert_eq!(config.analysis.sample_fraction, Some(0.5));
    }

    #[test]
    fn amplification_reads_custom_patterns() {
        let experiment: Experiment = toml::from_str(
            r#"
            protocol = "amplification"

            [run]
            rounds = 10

            [patterns]
            u0 = [[0, 0, 0, 0]]
            u1 = [[1, 1, 1, 1]]
            "#,
        )
        .unwrap();
        assert!(matches!(experiment, Experiment::Amplification(c) if c.patterns.is_some()));
    }

    #[test]
    fn polarisation_defaults_to_a_weak_source() {
        let experiment: Experiment = toml::from_str(
            r#"
            protocol = "polarisation"

            [run]
            rounds = 100
            "#,
        )
        .unwrap();
        assert!(matches!(experiment, Experiment::Polarisation(c) if c.emit_probability == 0.05));
    }
}
