//! Device-independent randomness expansion from a CHSH test.
//!
//! A source distributes EPR pairs to two measuring systems. System A picks X
//! or Z, system B picks (X+Z)/sqrt(2) or (X-Z)/sqrt(2). The CHSH value,
//! corrected for finite statistics, bounds the min-entropy of the outcomes,
//! which a seeded extractor then turns into near-uniform bits.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::basis::BellBasis;
use crate::config::{AnalysisConfig, LinkSettings, NetworkConfig, PartyConfig, RunConfig};
use crate::coordinator::ProtocolCoordinator;
use crate::errors::ExperimentError;
use crate::network::{ResourceKind, SimulatedNetwork};
use crate::protocols::party_buffer;
use crate::stats::{self, ExtractorSeed, PartyData, bit_string};

pub const SOURCE: &str = "Source";
pub const SYSTEM_A: &str = "SysA";
pub const SYSTEM_B: &str = "SysB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertifiedExpansionConfig {
    pub run: RunConfig,
    #[serde(default)]
    pub link: LinkSettings,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl CertifiedExpansionConfig {
    pub fn new(rounds: usize) -> Self {
        Self {
            run: RunConfig::new(rounds),
            link: LinkSettings::default(),
            analysis: AnalysisConfig::default(),
        }
    }

    pub fn network(&self) -> NetworkConfig {
        NetworkConfig::new("certified-expansion")
            .with_link(SOURCE, SYSTEM_A)
            .with_link(SOURCE, SYSTEM_B)
            .with_links(self.link.clone())
    }

    pub fn parties(&self) -> Vec<PartyConfig<BellBasis>> {
        vec![
            PartyConfig::generator(SOURCE, [SYSTEM_A, SYSTEM_B], ResourceKind::EprPair),
            PartyConfig::measurer(SYSTEM_A).with_bases([BellBasis::X, BellBasis::Z]),
            PartyConfig::measurer(SYSTEM_B).with_bases([BellBasis::XPlusZ, BellBasis::XMinusZ]),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertifiedExpansionReport {
    pub rounds: usize,
    /// Measured CHSH value
    pub chsh: f64,
    pub correction: f64,
    /// Certified min-entropy of the raw outcomes, in bits
    pub min_entropy: f64,
    /// Extracted bits, when a seed was supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<String>,
}

/// Runs the CHSH test and, given a seed, extracts certified randomness.
pub fn run(
    config: &CertifiedExpansionConfig,
    seed: Option<ExtractorSeed>,
) -> Result<CertifiedExpansionReport, ExperimentError> {
    let network = SimulatedNetwork::new(config.network())?;
    let results = ProtocolCoordinator::new(config.run.clone()).run(network, &config.parties())?;

    let system_a = party_buffer(&results, SYSTEM_A)?;
    let system_b = party_buffer(&results, SYSTEM_B)?;
    stats::check_shared_resources(system_a, system_b)?;

    let a = PartyData::from_buffer(system_a)?;
    let b = PartyData::from_buffer(system_b)?;
    let chsh = stats::estimate_bipartite_correlation(&a, &b)?;
    let correction = stats::statistical_correction(results.rounds(), config.analysis.confidence)?;
    let min_entropy = stats::min_entropy_bound(results.rounds(), chsh, correction)?;

    if chsh - correction <= 2.0 {
        warn!(chsh, correction, "No Bell violation after correction; nothing is certified");
    }

    let extracted = match seed {
        Some(seed) => {
            let source: Vec<bool> = a.outcomes.iter().chain(&b.outcomes).map(|&bit| bit == 1).collect();
            let bits = stats::extract(&source, seed, min_entropy, config.analysis.epsilon)?;
            Some(bit_string(&bits))
        }
        None => None,
    };

    info!(
        rounds = results.rounds(),
        chsh,
        correction,
        min_entropy,
        extracted = extracted.as_ref().map(String::len),
        "Certified expansion finished"
    );

    Ok(CertifiedExpansionReport {
        rounds: results.rounds(),
        chsh,
        correction,
        min_entropy,
        extracted,
    })
}
