//! Four-party randomness amplification test.
//!
//! A source shares a four-qubit entangled state with four measuring systems,
//! each choosing X (setting 0) or Z (setting 1) per round. The estimator counts rounds whose setting
//! pattern lies in one reference set while the outcome pattern lies in the
//! other.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::basis::BellBasis;
use crate::config::{LinkSettings, NetworkConfig, PartyConfig, RunConfig};
use crate::coordinator::ProtocolCoordinator;
use crate::errors::ExperimentError;
use crate::network::{ResourceKind, SimulatedNetwork};
use crate::protocols::party_buffer;
use crate::stats::{self, PartyData, PatternSets};

pub const SOURCE: &str = "Source";
pub const SYSTEMS: [&str; 4] = ["SysA", "SysB", "SysC", "SysD"];

/// Reference patterns; the single-excitation sets are used when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub u0: Vec<Vec<u8>>,
    pub u1: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmplificationConfig {
    pub run: RunConfig,
    #[serde(default)]
    pub link: LinkSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<PatternConfig>,
}

impl AmplificationConfig {
    pub fn new(rounds: usize) -> Self {
        Self {
            run: RunConfig::new(rounds),
            link: LinkSettings::default(),
            patterns: None,
        }
    }

    pub fn network(&self) -> NetworkConfig {
        SYSTEMS
            .iter()
            .fold(NetworkConfig::new("amplification"), |network, system| {
                network.with_link(SOURCE, *system)
            })
            .with_links(self.link.clone())
    }

    pub fn parties(&self) -> Vec<PartyConfig<BellBasis>> {
        std::iter::once(PartyConfig::generator(SOURCE, SYSTEMS, ResourceKind::FourPartite))
            .chain(
                SYSTEMS
                    .iter()
                    .map(|system| PartyConfig::measurer(*system).with_bases([BellBasis::X, BellBasis::Z])),
            )
            .collect()
    }

    pub fn pattern_sets(&self) -> Result<PatternSets, ExperimentError> {
        let sets = match &self.patterns {
            Some(p) => PatternSets::new(p.u0.clone(), p.u1.clone())?,
            None => PatternSets::single_excitation(SYSTEMS.len())?,
        };
        Ok(sets)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmplificationReport {
    pub rounds: usize,
    pub estimate: f64,
    /// Set when both reference sets hold the same patterns
    pub identical_patterns: bool,
}

/// Runs the four-party test and evaluates the pattern estimator.
pub fn run(config: &AmplificationConfig) -> Result<AmplificationReport, ExperimentError> {
    let patterns = config.pattern_sets()?;
    let network = SimulatedNetwork::new(config.network())?;
    let results = ProtocolCoordinator::new(config.run.clone()).run(network, &config.parties())?;

    let first = party_buffer(&results, SYSTEMS[0])?;
    let mut data = Vec::with_capacity(SYSTEMS.len());
    for system in SYSTEMS {
        let buffer = party_buffer(&results, system)?;
        stats::check_shared_resources(first, buffer)?;
        data.push(PartyData::from_buffer(buffer)?);
    }

    let estimate = stats::estimate_multipartite_correlation(&data, &patterns)?;
    info!(rounds = results.rounds(), estimate, "Amplification test finished");

    Ok(AmplificationReport {
        rounds: results.rounds(),
        estimate,
        identical_patterns: patterns.is_identical(),
    })
}
