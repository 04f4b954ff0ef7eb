//! BB84 over a three-node line `Alice -> Eve -> Bob`.
//!
//! Alice encodes a random bit in a random conjugate basis, Eve relays the
//! qubit (optionally measuring and resending it) and Bob measures in a random
//! basis. Sifting keeps the rounds where Alice's and Bob's bases agree.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::basis::Bb84Basis;
use crate::config::{AnalysisConfig, LinkSettings, NetworkConfig, PartyConfig, RunConfig};
use crate::coordinator::ProtocolCoordinator;
use crate::errors::ExperimentError;
use crate::network::{ResourceKind, SimulatedNetwork};
use crate::protocols::party_buffer;
use crate::stats::{self, bit_string};

pub const ALICE: &str = "Alice";
pub const EVE: &str = "Eve";
pub const BOB: &str = "Bob";

/// Stream of the run seed used for sampling the test bits.
const ANALYSIS_STREAM: u64 = 1 << 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bb84Config {
    pub run: RunConfig,
    #[serde(default)]
    pub link: LinkSettings,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Whether Eve measures and resends every qubit
    #[serde(default)]
    pub intercept: bool,
}

impl Bb84Config {
    pub fn new(rounds: usize) -> Self {
        Self {
            run: RunConfig::new(rounds),
            link: LinkSettings::default(),
            analysis: AnalysisConfig::default(),
            intercept: false,
        }
    }

    pub fn network(&self) -> NetworkConfig {
        NetworkConfig::new("bb84")
            .with_link(ALICE, EVE)
            .with_link(EVE, BOB)
            .with_links(self.link.clone())
    }

    pub fn parties(&self) -> Vec<PartyConfig<Bb84Basis>> {
        vec![
            PartyConfig::generator(ALICE, [EVE], ResourceKind::Single).with_bases(Bb84Basis::ALL),
            PartyConfig::relay(EVE, BOB, self.intercept).with_bases(Bb84Basis::ALL),
            PartyConfig::measurer(BOB).with_bases(Bb84Basis::ALL),
        ]
    }
}

/// Statistics of a BB84 run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bb84Report {
    pub rounds: usize,
    pub intercepted: bool,
    pub sifted_length: usize,
    /// Sifted bits disclosed for error estimation
    pub sampled: usize,
    pub errors: usize,
    /// Quantum bit error rate as a fraction
    pub qber: f64,
    /// Sifted bits left after disclosure
    pub key_length: usize,
    pub alice_key: String,
    pub bob_key: String,
}

/// Runs BB84 and estimates the quantum bit error rate.
pub fn run(config: &Bb84Config) -> Result<Bb84Report, ExperimentError> {
    let network = SimulatedNetwork::new(config.network())?;
    let results = ProtocolCoordinator::new(config.run.clone()).run(network, &config.parties())?;

    let alice = party_buffer(&results, ALICE)?;
    let bob = party_buffer(&results, BOB)?;
    let key = stats::sift(alice, bob, |a, b| a == b)?;

    let mut rng = config.run.rng(ANALYSIS_STREAM);
    let estimate = stats::estimate_error_rate(&key, config.analysis.sample_fraction, &mut rng)?;

    info!(
        rounds = results.rounds(),
        sifted = key.len(),
        sampled = estimate.sampled,
        qber = estimate.rate,
        intercept = config.intercept,
        "BB84 finished"
    );

    Ok(Bb84Report {
        rounds: results.rounds(),
        intercepted: config.intercept,
        sifted_length: key.len(),
        sampled: estimate.sampled,
        errors: estimate.errors,
        qber: estimate.rate,
        key_length: estimate.remaining.len(),
        alice_key: bit_string(&estimate.remaining.bits_a()),
        bob_key: bit_string(&estimate.remaining.bits_b()),
    })
}
