//! Random bits from polarised single photons.
//!
//! A weak source emits a photon with a fixed probability per round. Each
//! emitted photon passes a filter at pi/4 to its polarisation axis (a
//! Hadamard) and is measured, so every emission yields one fair bit. The
//! output signal holds its last value between emissions.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::basis::Bb84Basis;
use crate::config::{LinkSettings, NetworkConfig, PartyConfig, RunConfig};
use crate::coordinator::ProtocolCoordinator;
use crate::errors::ExperimentError;
use crate::network::SimulatedNetwork;
use crate::protocols::party_buffer;
use crate::stats::bit_string;

pub const GENERATOR: &str = "Gen";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarisationConfig {
    pub run: RunConfig,
    #[serde(default)]
    pub link: LinkSettings,
    /// Chance that the source emits a photon in a round
    #[serde(default = "default_emit_probability")]
    pub emit_probability: f64,
}

fn default_emit_probability() -> f64 {
    0.05
}

impl PolarisationConfig {
    pub fn new(rounds: usize) -> Self {
        Self {
            run: RunConfig::new(rounds),
            link: LinkSettings::default(),
            emit_probability: default_emit_probability(),
        }
    }

    pub fn with_emit_probability(mut self, p: f64) -> Self {
        self.emit_probability = p;
        self
    }

    pub fn network(&self) -> NetworkConfig {
        NetworkConfig::new("gen_pol")
            .with_node(GENERATOR)
            .with_links(self.link.clone())
    }

    pub fn parties(&self) -> Vec<PartyConfig<Bb84Basis>> {
        vec![PartyConfig::emitter(GENERATOR, self.emit_probability).with_bases([Bb84Basis::Hadamard])]
    }
}

/// Per-round emission flags and output signal of the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolarisationReport {
    pub rounds: usize,
    pub emissions: usize,
    /// Emissions measured as 1
    pub ones: usize,
    /// Per round: `1` when a photon was emitted
    pub emitted: String,
    /// Per round: the output signal after the round
    pub signal: String,
    /// Measured bits of the emitted photons, in round order
    pub random_bits: String,
}

/// Runs the single-source generator.
pub fn run(config: &PolarisationConfig) -> Result<PolarisationReport, ExperimentError> {
    let network = SimulatedNetwork::new(config.network())?;
    let results = ProtocolCoordinator::new(config.run.clone()).run(network, &config.parties())?;
    let buffer = party_buffer(&results, GENERATOR)?;

    let emitted: Vec<bool> = buffer.resource_ids().map(|id| id.is_some()).collect();
    let signal: Vec<bool> = buffer.outcomes().map(|bit| bit == Some(1)).collect();
    let random_bits: Vec<bool> = emitted
        .iter()
        .zip(&signal)
        .filter_map(|(&emit, &bit)| emit.then_some(bit))
        .collect();
    let ones = random_bits.iter().filter(|&&bit| bit).count();

    info!(
        rounds = results.rounds(),
        emissions = random_bits.len(),
        ones,
        "Polarisation generator finished"
    );

    Ok(PolarisationReport {
        rounds: results.rounds(),
        emissions: random_bits.len(),
        ones,
        emitted: bit_string(&emitted),
        signal: bit_string(&signal),
        random_bits: bit_string(&random_bits),
    })
}
