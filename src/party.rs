//! Per-party round loop.
//!
//! A party walks `Connecting -> RoundLoop(0..N) -> Disconnecting -> Done`.
//! Within a round it waits at the barrier (when synchronized), makes at most
//! one basis choice, performs its channel operation and appends exactly one
//! record to its buffer.

use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, trace, warn};

use crate::basis::{BasisLabel, Rotation, preparation};
use crate::config::{PartyConfig, Role};
use crate::errors::{LinkError, PartyError};
use crate::network::{QuantumLink, ResourceKind};
use crate::record::{BasisChoice, ResultBuffer, RoundRecord};
use crate::sync::{CancellationToken, RoundBarrier};

/// Lifecycle of a party task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyState {
    Connecting,
    RoundLoop { round: usize },
    Disconnecting,
    Done,
}

/// A party's seat at the round barrier.
#[derive(Debug, Clone, Copy)]
pub struct BarrierSeat<'a> {
    pub barrier: &'a RoundBarrier,
    pub index: usize,
}

/// One party of a run, driving its link round by round.
pub struct PartyRole<'a, L, B, R> {
    config: &'a PartyConfig<B>,
    link: L,
    rng: R,
    seat: Option<BarrierSeat<'a>>,
    cancel: CancellationToken,
    retry_backoff: Duration,
    state: PartyState,
    /// Last measured value of an emitter's output
    signal: u8,
}

fn link_failure(round: usize) -> impl FnOnce(LinkError) -> PartyError {
    move |source| PartyError::Link { round, source }
}

impl<'a, L, B, R> PartyRole<'a, L, B, R>
where
    L: QuantumLink,
    B: BasisLabel,
    R: Rng,
{
    pub fn new(
        config: &'a PartyConfig<B>,
        link: L,
        rng: R,
        seat: Option<BarrierSeat<'a>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            link,
            rng,
            seat,
            cancel,
            retry_backoff: Duration::from_micros(200),
            state: PartyState::Connecting,
            signal: 0,
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn state(&self) -> PartyState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Runs every round, filling `buffer` to its capacity.
    pub fn run(mut self, mut buffer: ResultBuffer<B>) -> Result<ResultBuffer<B>, PartyError> {
        match self.drive(&mut buffer) {
            Ok(()) => Ok(buffer),
            Err(err) => {
                if let Err(close) = self.link.disconnect() {
                    warn!(party = %self.config.name, error = %close, "Disconnect after failure failed");
                }
                Err(err)
            }
        }
    }

    fn drive(&mut self, buffer: &mut ResultBuffer<B>) -> Result<(), PartyError> {
        loop {
            self.state = match self.state {
                PartyState::Connecting => {
                    self.link.connect().map_err(link_failure(0))?;
                    info!(party = %self.config.name, rounds = buffer.capacity(), "Connected");
                    PartyState::RoundLoop { round: 0 }
                }
                PartyState::RoundLoop { round } if round == buffer.capacity() => {
                    PartyState::Disconnecting
                }
                PartyState::RoundLoop { round } => {
                    let record = self.play_round(round)?;
                    debug!(
                        party = %self.config.name,
                        round,
                        outcome = ?record.outcome,
                        resource = ?record.resource_id,
                        "Round recorded"
                    );
                    buffer.push(record);
                    PartyState::RoundLoop { round: round + 1 }
                }
                PartyState::Disconnecting => {
                    self.link
                        .disconnect()
                        .map_err(link_failure(buffer.capacity()))?;
                    PartyState::Done
                }
                PartyState::Done => {
                    info!(party = %self.config.name, "Done");
                    return Ok(());
                }
            };
        }
    }

    fn play_round(&mut self, round: usize) -> Result<RoundRecord<B>, PartyError> {
        if self.cancel.is_cancelled() {
            return Err(PartyError::Link {
                round,
                source: LinkError::Cancelled,
            });
        }

        if let Some(seat) = self.seat {
            seat.barrier
                .wait(seat.index)
                .map_err(|source| PartyError::Barrier { round, source })?;
        }

        let config = self.config;
        match &config.role {
            Role::Generator { targets, resource } => self.generate(round, targets, *resource),
            Role::Relay { next, intercept } => self.relay(round, next, *intercept),
            Role::Measurer => self.measure_incoming(round),
            Role::Emitter { emit_probability } => self.emit(round, *emit_probability),
        }
    }

    fn choose_basis(&mut self) -> Option<BasisChoice<B>> {
        if self.config.bases.is_empty() {
            return None;
        }
        let setting = self.rng.random_range(0..self.config.bases.len());
        Some(BasisChoice {
            setting: setting as u8,
            basis: self.config.bases[setting],
        })
    }

    /// Prepares a resource, retrying transient shortages until cancelled.
    fn prepare(&mut self, round: usize, kind: ResourceKind) -> Result<Vec<L::Qubit>, PartyError> {
        let mut attempts = 0u32;
        loop {
            match self.link.prepare(kind) {
                Ok(qubits) => {
                    if attempts > 0 {
                        trace!(party = %self.config.name, round, attempts, "Preparation succeeded after retry");
                    }
                    return Ok(qubits);
                }
                Err(err) if err.is_transient() => {
                    attempts += 1;
                    if attempts % 100 == 0 {
                        warn!(party = %self.config.name, round, attempts, "Still waiting for a qubit");
                    }
                    if self.cancel.is_cancelled() {
                        return Err(PartyError::Link {
                            round,
                            source: LinkError::Cancelled,
                        });
                    }
                    thread::sleep(self.retry_backoff);
                }
                Err(err) => return Err(PartyError::Link { round, source: err }),
            }
        }
    }

    /// Encodes `bit` into `qubit` as an eigenstate of `basis`.
    fn encode(&mut self, round: usize, qubit: &L::Qubit, bit: u8, basis: Option<B>) -> Result<(), PartyError> {
        let mut ops: Vec<Rotation> = Vec::with_capacity(4);
        if bit == 1 {
            ops.push(Rotation::PauliX);
        }
        if let Some(basis) = basis {
            ops.extend(preparation(basis.transform()));
        }
        self.link
            .apply_basis_transform(qubit, &ops)
            .map_err(link_failure(round))
    }

    fn generate(
        &mut self,
        round: usize,
        targets: &[String],
        kind: ResourceKind,
    ) -> Result<RoundRecord<B>, PartyError> {
        let chosen_basis = self.choose_basis();
        let qubits = self.prepare(round, kind)?;
        let resource_id = qubits.first().map(|q| self.link.resource_id(q));

        let outcome = match (kind, qubits.first()) {
            (ResourceKind::Single, Some(qubit)) => {
                let bit = self.rng.random_range(0..=1u8);
                self.encode(round, qubit, bit, chosen_basis.map(|c| c.basis))?;
                Some(bit)
            }
            _ => None,
        };

        for (qubit, target) in qubits.into_iter().zip(targets) {
            self.link.send(qubit, target).map_err(link_failure(round))?;
        }

        Ok(RoundRecord {
            round_index: round,
            chosen_basis,
            outcome,
            resource_id,
        })
    }

    fn relay(&mut self, round: usize, next: &str, intercept: bool) -> Result<RoundRecord<B>, PartyError> {
        let chosen_basis = if intercept { self.choose_basis() } else { None };
        let qubit = self.link.receive().map_err(link_failure(round))?;
        let resource_id = Some(self.link.resource_id(&qubit));

        if !intercept {
            self.link.send(qubit, next).map_err(link_failure(round))?;
            return Ok(RoundRecord {
                round_index: round,
                chosen_basis: None,
                outcome: None,
                resource_id,
            });
        }

        let basis = chosen_basis.map(|c| c.basis);
        if let Some(basis) = basis {
            self.link
                .apply_basis_transform(&qubit, basis.transform())
                .map_err(link_failure(round))?;
        }
        let bit = self.link.measure(qubit).map_err(link_failure(round))?;

        let mut fresh = self.prepare(round, ResourceKind::Single)?;
        if let Some(replacement) = fresh.pop() {
            self.encode(round, &replacement, bit, basis)?;
            self.link.send(replacement, next).map_err(link_failure(round))?;
        }

        Ok(RoundRecord {
            round_index: round,
            chosen_basis,
            outcome: Some(bit),
            resource_id,
        })
    }

    fn emit(&mut self, round: usize, emit_probability: f64) -> Result<RoundRecord<B>, PartyError> {
        if self.rng.random::<f64>() >= emit_probability {
            return Ok(RoundRecord {
                round_index: round,
                chosen_basis: None,
                outcome: Some(self.signal),
                resource_id: None,
            });
        }

        let chosen_basis = self.choose_basis();
        let mut qubits = self.prepare(round, ResourceKind::Single)?;
        let Some(qubit) = qubits.pop() else {
            return Err(PartyError::Link {
                round,
                source: LinkError::ResourceUnavailable {
                    node: self.link.node().to_string(),
                },
            });
        };
        let resource_id = Some(self.link.resource_id(&qubit));

        if let Some(choice) = chosen_basis {
            self.link
                .apply_basis_transform(&qubit, choice.basis.transform())
                .map_err(link_failure(round))?;
        }
        self.signal = self.link.measure(qubit).map_err(link_failure(round))?;

        Ok(RoundRecord {
            round_index: round,
            chosen_basis,
            outcome: Some(self.signal),
            resource_id,
        })
    }

    fn measure_incoming(&mut self, round: usize) -> Result<RoundRecord<B>, PartyError> {
        let chosen_basis = self.choose_basis();
        let qubit = self.link.receive().map_err(link_failure(round))?;
        let resource_id = Some(self.link.resource_id(&qubit));

        if let Some(choice) = chosen_basis {
            self.link
                .apply_basis_transform(&qubit, choice.basis.transform())
                .map_err(link_failure(round))?;
        }
        let bit = self.link.measure(qubit).map_err(link_failure(round))?;

        Ok(RoundRecord {
            round_index: round,
            chosen_basis,
            outcome: Some(bit),
            resource_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::Bb84Basis;
    use crate::record::ResourceId;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Link that records calls and fails preparations on demand.
    #[derive(Default)]
    struct ScriptedLink {
        shortages_per_prepare: u32,
        shortage_left: u32,
        prepared: u64,
        sent: Vec<(u64, String)>,
        transforms: Vec<Vec<Rotation>>,
        fail_send_at: Option<usize>,
        sends: usize,
        disconnected: bool,
    }

    impl QuantumLink for ScriptedLink {
        type Qubit = u64;

        fn node(&self) -> &str {
            "scripted"
        }

        fn connect(&mut self) -> Result<(), LinkError> {
            Ok(())
        }

        fn prepare(&mut self, kind: ResourceKind) -> Result<Vec<u64>, LinkError> {
            if self.shortage_left > 0 {
                self.shortage_left -= 1;
                return Err(LinkError::ResourceUnavailable { node: "scripted".into() });
            }
            self.shortage_left = self.shortages_per_prepare;
            self.prepared += 1;
            Ok(vec![self.prepared; kind.qubits()])
        }

        fn resource_id(&self, qubit: &u64) -> ResourceId {
            ResourceId(*qubit)
        }

        fn send(&mut self, qubit: u64, destination: &str) -> Result<(), LinkError> {
            if self.fail_send_at == Some(self.sends) {
                return Err(LinkError::Disconnected { node: destination.into() });
            }
            self.sends += 1;
            self.sent.push((qubit, destination.to_string()));
            Ok(())
        }

        fn receive(&mut self) -> Result<u64, LinkError> {
            Err(LinkError::Cancelled)
        }

        fn apply_basis_transform(&mut self, _: &u64, ops: &[Rotation]) -> Result<(), LinkError> {
            self.transforms.push(ops.to_vec());
            Ok(())
        }

        fn measure(&mut self, _: u64) -> Result<u8, LinkError> {
            Ok(0)
        }

        fn disconnect(&mut self) -> Result<(), LinkError> {
            self.disconnected = true;
            Ok(())
        }
    }

    #[test]
    fn generator_retries_shortages_and_keeps_rounds_gapless() {
        let config = PartyConfig::generator("alice", ["bob"], ResourceKind::Single)
            .with_bases(Bb84Basis::ALL);
        let link = ScriptedLink {
            shortages_per_prepare: 2,
            shortage_left: 2,
            ..Default::default()
        };
        let party = PartyRole::new(
            &config,
            link,
            ChaCha8Rng::seed_from_u64(3),
            None,
            CancellationToken::new(),
        )
        .with_retry_backoff(Duration::ZERO);

        let buffer = party.run(ResultBuffer::new("alice", 12)).unwrap();

        assert!(buffer.is_complete());
        for (i, record) in buffer.records().iter().enumerate() {
            assert_eq!(record.round_index, i);
            assert_eq!(record.resource_id, Some(ResourceId(i as u64 + 1)));
            assert!(record.chosen_basis.is_some());
            assert!(record.outcome.is_some());
        }
    }

    #[test]
    fn generator_encodes_bit_before_basis_rotation() {
        let config =
            PartyConfig::generator("alice", ["bob"], ResourceKind::Single).with_bases([Bb84Basis::Hadamard]);
        let mut party = PartyRole::new(
            &config,
            ScriptedLink::default(),
            ChaCha8Rng::seed_from_u64(5),
            None,
            CancellationToken::new(),
        );

        for round in 0..8 {
            let record = party.play_round(round).unwrap();
            let ops = party.link.transforms.last().cloned().unwrap_or_default();
            match record.outcome {
                Some(1) => assert_eq!(ops, vec![Rotation::PauliX, Rotation::Hadamard]),
                Some(0) => assert_eq!(ops, vec![Rotation::Hadamard]),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
    }

    #[test]
    fn entangled_generator_sends_one_qubit_per_target() {
        let config = PartyConfig::<Bb84Basis>::generator("source", ["a", "b"], ResourceKind::EprPair);
        let mut party = PartyRole::new(
            &config,
            ScriptedLink::default(),
            ChaCha8Rng::seed_from_u64(1),
            None,
            CancellationToken::new(),
        );

        let record = party.play_round(0).unwrap();
        assert_eq!(record.outcome, None);
        assert_eq!(record.chosen_basis, None);
        assert_eq!(party.link.sent, vec![(1, "a".to_string()), (1, "b".to_string())]);
    }

    #[test]
    fn emitter_measures_every_emitted_qubit_locally() {
        let config = PartyConfig::emitter("gen", 1.0).with_bases([Bb84Basis::Hadamard]);
        let party = PartyRole::new(
            &config,
            ScriptedLink::default(),
            ChaCha8Rng::seed_from_u64(2),
            None,
            CancellationToken::new(),
        );

        let buffer = party.run(ResultBuffer::new("gen", 6)).unwrap();
        assert!(buffer.is_complete());
        assert!(buffer.records().iter().all(|r| r.resource_id.is_some() && r.outcome == Some(0)));
    }

    #[test]
    fn silent_emitter_holds_its_signal() {
        let config = PartyConfig::emitter("gen", 0.0).with_bases([Bb84Basis::Hadamard]);
        let mut party = PartyRole::new(
            &config,
            ScriptedLink::default(),
            ChaCha8Rng::seed_from_u64(2),
            None,
            CancellationToken::new(),
        );

        for round in 0..5 {
            let record = party.play_round(round).unwrap();
            assert_eq!(record.outcome, Some(0));
            assert_eq!(record.resource_id, None);
            assert_eq!(record.chosen_basis, None);
        }
        assert_eq!(party.link.prepared, 0);
        assert!(party.link.transforms.is_empty());
    }

    #[test]
    fn link_failure_names_round_and_disconnects() {
        let config = PartyConfig::<Bb84Basis>::generator("alice", ["bob"], ResourceKind::Single);
        let link = ScriptedLink {
            fail_send_at: Some(4),
            ..Default::default()
        };
        let party = PartyRole::new(
            &config,
            link,
            ChaCha8Rng::seed_from_u64(1),
            None,
            CancellationToken::new(),
        );

        let err = party.run(ResultBuffer::new("alice", 10)).unwrap_err();
        assert!(matches!(
            err,
            PartyError::Link {
                round: 4,
                source: LinkError::Disconnected { .. }
            }
        ));
    }

    #[test]
    fn cancelled_party_stops_before_next_round() {
        let config = PartyConfig::<Bb84Basis>::generator("alice", ["bob"], ResourceKind::Single);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let party = PartyRole::new(
            &config,
            ScriptedLink::default(),
            ChaCha8Rng::seed_from_u64(1),
            None,
            cancel,
        );

        let err = party.run(ResultBuffer::new("alice", 3)).unwrap_err();
        assert!(err.is_secondary());
        assert_eq!(err.round(), 0);
    }
}
