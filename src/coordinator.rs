//! Spawns one task per party, joins them and reports the first real failure.

use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::basis::BasisLabel;
use crate::config::{PartyConfig, Role, RunConfig};
use crate::errors::{BarrierError, PartyError, RunError};
use crate::network::{QuantumNetwork, ResourceKind};
use crate::party::{BarrierSeat, PartyRole};
use crate::record::ResultBuffer;
use crate::sync::{CancellationToken, RoundBarrier};

/// Completed buffers of a run, keyed by party name.
#[derive(Debug, Clone)]
pub struct RunResults<B> {
    rounds: usize,
    buffers: BTreeMap<String, ResultBuffer<B>>,
}

impl<B> RunResults<B> {
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn get(&self, party: &str) -> Option<&ResultBuffer<B>> {
        self.buffers.get(party)
    }

    pub fn parties(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    pub fn into_inner(self) -> BTreeMap<String, ResultBuffer<B>> {
        self.buffers
    }
}

/// Shuts the network down when dropped, on success and failure alike.
struct NetworkGuard<N: QuantumNetwork> {
    network: N,
}

impl<N: QuantumNetwork> Drop for NetworkGuard<N> {
    fn drop(&mut self) {
        self.network.shutdown();
    }
}

enum TaskOutcome<B> {
    Finished(ResultBuffer<B>),
    Failed,
    Panicked,
}

/// Failures reported by party tasks, in the order they happened.
#[derive(Default)]
struct FailureLog {
    entries: Mutex<Vec<(usize, PartyError)>>,
}

impl FailureLog {
    fn record(&self, party: usize, err: PartyError, cancel: &CancellationToken, barrier: &RoundBarrier) {
        self.entries.lock().push((party, err));
        cancel.cancel();
        barrier.abort();
    }

    /// First failure that is not merely a reaction to cancellation.
    fn root_cause(self) -> Option<(usize, PartyError)> {
        let mut entries = self.entries.into_inner();
        let position = entries
            .iter()
            .position(|(_, err)| !err.is_secondary())
            .unwrap_or(0);
        if entries.is_empty() {
            None
        } else {
            Some(entries.swap_remove(position))
        }
    }
}

/// Runs a fixed number of rounds across all parties of a network.
#[derive(Debug, Clone)]
pub struct ProtocolCoordinator {
    config: RunConfig,
}

impl ProtocolCoordinator {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs every party to completion and returns their buffers.
    ///
    /// Takes ownership of `network` and shuts it down exactly once before
    /// returning, whatever the outcome.
    pub fn run<N, B>(&self, network: N, parties: &[PartyConfig<B>]) -> Result<RunResults<B>, RunError>
    where
        N: QuantumNetwork,
        B: BasisLabel,
    {
        let guard = NetworkGuard { network };
        self.validate(&guard.network, parties)?;

        let rounds = self.config.rounds;
        let cancel = CancellationToken::new();
        let synchronized: Vec<usize> = parties
            .iter()
            .enumerate()
            .filter(|(_, p)| p.synchronized)
            .map(|(i, _)| i)
            .collect();
        let barrier = RoundBarrier::new(synchronized.len(), self.config.barrier_timeout());
        let failures = FailureLog::default();

        let mut tasks = Vec::with_capacity(parties.len());
        for (i, party) in parties.iter().enumerate() {
            let link = guard
                .network
                .link(&party.name, cancel.clone())
                .map_err(|source| RunError::ChannelFailure {
                    party: party.name.clone(),
                    round: 0,
                    source,
                })?;
            let seat = synchronized
                .iter()
                .position(|&p| p == i)
                .map(|index| BarrierSeat {
                    barrier: &barrier,
                    index,
                });
            let role = PartyRole::new(party, link, self.config.rng(i as u64), seat, cancel.clone())
                .with_retry_backoff(self.config.retry_backoff());
            tasks.push(role);
        }

        info!(
            parties = parties.len(),
            synchronized = synchronized.len(),
            rounds,
            "Starting run"
        );

        let outcomes: Vec<TaskOutcome<B>> = thread::scope(|s| {
            let handles: Vec<_> = tasks
                .into_iter()
                .enumerate()
                .map(|(i, role)| {
                    let (failures, cancel, barrier) = (&failures, &cancel, &barrier);
                    let buffer = ResultBuffer::new(parties[i].name.clone(), rounds);
                    s.spawn(move || {
                        match panic::catch_unwind(AssertUnwindSafe(|| role.run(buffer))) {
                            Ok(Ok(buffer)) => TaskOutcome::Finished(buffer),
                            Ok(Err(err)) => {
                                failures.record(i, err, cancel, barrier);
                                TaskOutcome::Failed
                            }
                            Err(_) => {
                                cancel.cancel();
                                barrier.abort();
                                TaskOutcome::Panicked
                            }
                        }
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(TaskOutcome::Panicked))
                .collect()
        });

        if let Some(i) = outcomes
            .iter()
            .position(|o| matches!(o, TaskOutcome::Panicked))
        {
            error!(party = %parties[i].name, "Party panicked");
            return Err(RunError::PartyPanicked {
                party: parties[i].name.clone(),
            });
        }

        if let Some((i, err)) = failures.root_cause() {
            let err = self.describe(parties, &synchronized, i, err);
            error!(error = %err, "Run failed");
            return Err(err);
        }

        let mut buffers = BTreeMap::new();
        for outcome in outcomes {
            if let TaskOutcome::Finished(buffer) = outcome {
                buffers.insert(buffer.party().to_string(), buffer);
            }
        }

        info!(rounds, "Run complete");
        Ok(RunResults { rounds, buffers })
    }

    fn describe<B>(
        &self,
        parties: &[PartyConfig<B>],
        synchronized: &[usize],
        index: usize,
        err: PartyError,
    ) -> RunError {
        let party = parties[index].name.clone();
        match err {
            PartyError::Link { round, source } => RunError::ChannelFailure { party, round, source },
            PartyError::Barrier {
                source: BarrierError::Timeout { round, missing },
                ..
            } => RunError::BarrierTimeout {
                round,
                missing: missing
                    .into_iter()
                    .filter_map(|seat| synchronized.get(seat))
                    .map(|&p| parties[p].name.clone())
                    .collect(),
            },
            PartyError::Barrier { round, source } => RunError::Aborted { party, round, source },
        }
    }

    fn validate<N, B>(&self, network: &N, parties: &[PartyConfig<B>]) -> Result<(), RunError>
    where
        N: QuantumNetwork,
        B: BasisLabel,
    {
        let invalid = |msg: String| -> Result<(), RunError> { Err(RunError::InvalidConfig(msg)) };

        if self.config.rounds == 0 {
            return invalid("a run needs at least one round".into());
        }
        if parties.is_empty() {
            return invalid("a run needs at least one party".into());
        }

        let mut names = HashSet::new();
        for party in parties {
            let name = &party.name;
            if !names.insert(name.as_str()) {
                return invalid(format!("party {name} is configured twice"));
            }
            if !network.has_node(name) {
                return invalid(format!("party {name} has no node in the network"));
            }
            if party.bases.len() > u8::MAX as usize {
                return invalid(format!("party {name} has too many bases"));
            }

            match &party.role {
                Role::Generator { targets, resource } => {
                    if targets.len() != resource.qubits() {
                        return invalid(format!(
                            "generator {name} prepares {} qubits for {} targets",
                            resource.qubits(),
                            targets.len()
                        ));
                    }
                    if *resource != ResourceKind::Single && !party.bases.is_empty() {
                        return invalid(format!("generator {name} cannot encode into an entangled resource"));
                    }
                    if let Some(t) = targets.iter().find(|t| !network.is_adjacent(name, t)) {
                        return invalid(format!("generator {name} has no link to {t}"));
                    }
                }
                Role::Relay { next, intercept } => {
                    if !network.is_adjacent(name, next) {
                        return invalid(format!("relay {name} has no link to {next}"));
                    }
                    if *intercept && party.bases.is_empty() {
                        return invalid(format!("intercepting relay {name} needs a basis set"));
                    }
                }
                Role::Measurer => {}
                Role::Emitter { emit_probability } => {
                    if !(0.0..=1.0).contains(emit_probability) {
                        return invalid(format!(
                            "emitter {name} has emit probability {emit_probability} outside [0, 1]"
                        ));
                    }
                }
            }
        }

        if parties.iter().all(|p| !p.synchronized) {
            warn!("No party is synchronized; rounds may drift apart");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::Bb84Basis;
    use crate::config::{LinkSettings, NetworkConfig};
    use crate::network::SimulatedNetwork;

    fn network() -> SimulatedNetwork {
        let config = NetworkConfig::new("bb84")
            .with_link("alice", "bob")
            .with_links(LinkSettings::default().with_seed(1));
        SimulatedNetwork::new(config).unwrap()
    }

    fn parties() -> Vec<PartyConfig<Bb84Basis>> {
        vec![
            PartyConfig::generator("alice", ["bob"], ResourceKind::Single).with_bases(Bb84Basis::ALL),
            PartyConfig::measurer("bob").with_bases(Bb84Basis::ALL),
        ]
    }

    #[test]
    fn every_buffer_holds_every_round() {
        for rounds in [1, 7, 40] {
            let coordinator = ProtocolCoordinator::new(RunConfig::new(rounds).with_seed(2));
            let results = coordinator.run(network(), &parties()).unwrap();
            for name in ["alice", "bob"] {
                let buffer = results.get(name).unwrap();
                assert!(buffer.is_complete());
                assert_eq!(buffer.len(), rounds);
            }
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let coordinator = ProtocolCoordinator::new(RunConfig::new(30).with_seed(77));
        let a = coordinator.run(network(), &parties()).unwrap();
        let b = coordinator.run(network(), &parties()).unwrap();
        assert_eq!(a.get("alice").unwrap().records(), b.get("alice").unwrap().records());
    }

    #[test]
    fn rejects_bad_configuration() {
        let coordinator = ProtocolCoordinator::new(RunConfig::new(5));

        let mut dup = parties();
        dup.push(PartyConfig::measurer("bob"));
        assert!(matches!(coordinator.run(network(), &dup), Err(RunError::InvalidConfig(_))));

        let backwards = vec![PartyConfig::<Bb84Basis>::generator("bob", ["alice"], ResourceKind::Single)];
        assert!(matches!(
            coordinator.run(network(), &backwards),
            Err(RunError::InvalidConfig(_))
        ));

        let zero = ProtocolCoordinator::new(RunConfig::new(0));
        assert!(matches!(zero.run(network(), &parties()), Err(RunError::InvalidConfig(_))));
    }
}
