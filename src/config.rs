//! Run, network, party and analysis configuration.
//!
//! Everything here deserializes from TOML so experiments can be described in
//! a file; the `with_*` builders cover programmatic use.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::core::NoiseModel;
use crate::network::ResourceKind;

/// Parameters of one coordinated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of protocol rounds N
    pub rounds: usize,
    /// How long a party may wait at the round barrier
    #[serde(default = "default_barrier_timeout_ms")]
    pub barrier_timeout_ms: u64,
    /// Pause between retries of a transiently failed preparation
    #[serde(default = "default_retry_backoff_us")]
    pub retry_backoff_us: u64,
    /// Master seed for every party's randomness; entropy from the OS if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_barrier_timeout_ms() -> u64 {
    5_000
}

fn default_retry_backoff_us() -> u64 {
    200
}

impl RunConfig {
    pub fn new(rounds: usize) -> Self {
        Self {
            rounds,
            barrier_timeout_ms: default_barrier_timeout_ms(),
            retry_backoff_us: default_retry_backoff_us(),
            seed: None,
        }
    }

    pub fn with_barrier_timeout(mut self, timeout: Duration) -> Self {
        self.barrier_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_us = backoff.as_micros() as u64;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.barrier_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_micros(self.retry_backoff_us)
    }

    /// Generator seeded from `seed` mixed with `stream`, or from the OS.
    pub fn rng(&self, stream: u64) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(stream);
                rng
            }
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }
}

/// Behaviour of every link in a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSettings {
    #[serde(default)]
    pub noise: NoiseModel,
    /// Chance that a qubit preparation reports a transient shortage
    #[serde(default)]
    pub transient_failure_probability: f64,
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    /// Seed for measurement and failure sampling inside the links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_receive_timeout_ms() -> u64 {
    10_000
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            noise: NoiseModel::Noiseless,
            transient_failure_probability: 0.0,
            receive_timeout_ms: default_receive_timeout_ms(),
            seed: None,
        }
    }
}

impl LinkSettings {
    pub fn with_noise(mut self, noise: NoiseModel) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_transient_failures(mut self, probability: f64) -> Self {
        self.transient_failure_probability = probability;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

/// Nodes and directed quantum links of a simulated network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub nodes: Vec<String>,
    /// Outgoing links per node
    #[serde(default)]
    pub topology: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub links: LinkSettings,
}

impl NetworkConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            topology: BTreeMap::new(),
            links: LinkSettings::default(),
        }
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        let node = node.into();
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
        self
    }

    /// Adds a directed link, registering both endpoints.
    pub fn with_link(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let (from, to) = (from.into(), to.into());
        self = self.with_node(from.clone()).with_node(to.clone());
        let targets = self.topology.entry(from).or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }
        self
    }

    pub fn with_links(mut self, links: LinkSettings) -> Self {
        self.links = links;
        self
    }

    pub fn has_node(&self, node: &str) -> bool {
        self.nodes.iter().any(|n| n == node)
    }

    pub fn is_adjacent(&self, from: &str, to: &str) -> bool {
        self.topology
            .get(from)
            .is_some_and(|targets| targets.iter().any(|t| t == to))
    }
}

/// Behaviour of a party in each round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Role {
    /// Prepares a resource each round and sends its qubits to `targets`,
    /// one qubit per target in order.
    Generator {
        targets: Vec<String>,
        #[serde(default = "default_resource")]
        resource: ResourceKind,
    },
    /// Forwards each incoming qubit to `next`; with `intercept` it measures
    /// and resends a fresh qubit prepared in the measured state.
    Relay {
        next: String,
        #[serde(default)]
        intercept: bool,
    },
    /// Measures each incoming qubit in a randomly chosen basis.
    Measurer,
    /// Emits a qubit with probability `emit_probability` per round and
    /// measures it locally. The recorded outcome is the output signal, which
    /// holds its last measured value through rounds without an emission.
    Emitter { emit_probability: f64 },
}

fn default_resource() -> ResourceKind {
    ResourceKind::Single
}

/// One party of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyConfig<B> {
    /// Node name, also the key of the party's result buffer
    pub name: String,
    pub role: Role,
    /// Bases chosen uniformly at random each round
    #[serde(default = "Vec::new")]
    pub bases: Vec<B>,
    /// Whether the party takes part in the round barrier
    #[serde(default = "default_synchronized")]
    pub synchronized: bool,
}

fn default_synchronized() -> bool {
    true
}

impl<B> PartyConfig<B> {
    fn with_role(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
            bases: Vec::new(),
            synchronized: true,
        }
    }

    pub fn generator<T: Into<String>>(
        name: impl Into<String>,
        targets: impl IntoIterator<Item = T>,
        resource: ResourceKind,
    ) -> Self {
        let targets = targets.into_iter().map(Into::into).collect();
        Self::with_role(name, Role::Generator { targets, resource })
    }

    pub fn relay(name: impl Into<String>, next: impl Into<String>, intercept: bool) -> Self {
        Self::with_role(
            name,
            Role::Relay {
                next: next.into(),
                intercept,
            },
        )
    }

    pub fn measurer(name: impl Into<String>) -> Self {
        Self::with_role(name, Role::Measurer)
    }

    pub fn emitter(name: impl Into<String>, emit_probability: f64) -> Self {
        Self::with_role(name, Role::Emitter { emit_probability })
    }

    pub fn with_bases(mut self, bases: impl IntoIterator<Item = B>) -> Self {
        self.bases = bases.into_iter().collect();
        self
    }

    pub fn unsynchronized(mut self) -> Self {
        self.synchronized = false;
        self
    }
}

/// Post-processing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Fraction of the sifted key sacrificed for error estimation; the whole
    /// key is compared when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_fraction: Option<f64>,
    /// Confidence level alpha of the statistical correction
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Extractor error epsilon
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

fn default_confidence() -> f64 {
    0.99
}

fn default_epsilon() -> f64 {
    1e-6
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_fraction: None,
            confidence: default_confidence(),
            epsilon: default_epsilon(),
        }
    }
}

impl AnalysisConfig {
    pub fn with_sample_fraction(mut self, fraction: f64) -> Self {
        self.sample_fraction = Some(fraction);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::Bb84Basis;

    #[test]
    fn network_builder_tracks_directed_links() {
        let network = NetworkConfig::new("line")
            .with_link("alice", "eve")
            .with_link("eve", "bob")
            .with_link("alice", "eve");

        assert_eq!(network.nodes, vec!["alice", "eve", "bob"]);
        assert!(network.is_adjacent("alice", "eve"));
        assert!(!network.is_adjacent("eve", "alice"));
        assert_eq!(network.topology["alice"].len(), 1);
    }

    #[test]
    fn party_reads_from_toml_with_defaults() {
        let party: PartyConfig<Bb84Basis> = toml::from_str(
            r#"
            name = "bob"
            bases = ["Z", "X"]
            role = { kind = "measurer" }
            "#,
        )
        .unwrap();

        assert_eq!(party, PartyConfig::measurer("bob").with_bases(Bb84Basis::ALL));
        assert!(party.synchronized);
    }

    #[test]
    fn seeded_streams_are_reproducible_and_distinct() {
        use rand::Rng;

        let config = RunConfig::new(10).with_seed(9);
        let a: u64 = config.rng(1).random();
        let b: u64 = config.rng(1).random();
        let c: u64 = config.rng(2).random();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
