use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, trace};

use crate::basis::Rotation;
use crate::config::NetworkConfig;
use crate::core::{Gate, Measurement, NoiseChannel, QuantumState};
use crate::errors::{LinkError, RunError, StateError};
use crate::network::{QuantumLink, QuantumNetwork, ResourceKind};
use crate::record::ResourceId;
use crate::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Qubit handle of the simulated backend.
///
/// Qubits of one resource share a density matrix; the handle names the slot.
#[derive(Debug)]
pub struct SimQubit {
    resource: ResourceId,
    slot: usize,
    register: Arc<Mutex<QuantumState>>,
}

impl SimQubit {
    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// In-process network backed by density-matrix simulation.
///
/// Each node owns an inbox channel; a link can push qubits only into the
/// inboxes of the nodes its topology entry points at.
pub struct SimulatedNetwork {
    config: NetworkConfig,
    noise: Option<NoiseChannel>,
    inboxes: HashMap<String, (Sender<SimQubit>, Receiver<SimQubit>)>,
    next_resource: Arc<AtomicU64>,
    shut_down: bool,
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig) -> Result<Self, RunError> {
        let noise = config
            .links
            .noise
            .channel()
            .map_err(|e| RunError::InvalidConfig(format!("link noise: {e}")))?;

        let p = config.links.transient_failure_probability;
        if !(0.0..1.0).contains(&p) {
            return Err(RunError::InvalidConfig(format!(
                "transient failure probability {p} must be in [0, 1)"
            )));
        }

        for (from, targets) in &config.topology {
            if let Some(unknown) = std::iter::once(from)
                .chain(targets)
                .find(|n| !config.has_node(n))
            {
                return Err(RunError::InvalidConfig(format!(
                    "topology references unknown node {unknown}"
                )));
            }
        }

        let inboxes = config
            .nodes
            .iter()
            .map(|node| (node.clone(), channel::unbounded()))
            .collect();

        info!(
            network = %config.name,
            nodes = config.nodes.len(),
            noise = ?config.links.noise,
            "Simulated network up"
        );

        Ok(Self {
            config,
            noise,
            inboxes,
            next_resource: Arc::new(AtomicU64::new(0)),
            shut_down: false,
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn link_rng(&self, node: &str) -> ChaCha8Rng {
        match self.config.links.seed {
            Some(seed) => {
                let stream = self
                    .config
                    .nodes
                    .iter()
                    .position(|n| n == node)
                    .unwrap_or_default() as u64;
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(stream);
                rng
            }
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }
}

impl QuantumNetwork for SimulatedNetwork {
    type Link = SimulatedLink;

    fn has_node(&self, node: &str) -> bool {
        self.config.has_node(node)
    }

    fn is_adjacent(&self, from: &str, to: &str) -> bool {
        self.config.is_adjacent(from, to)
    }

    fn link(&self, node: &str, cancel: CancellationToken) -> Result<SimulatedLink, LinkError> {
        if self.shut_down {
            return Err(LinkError::Disconnected {
                node: node.to_string(),
            });
        }
        let (_, inbox) = self
            .inboxes
            .get(node)
            .ok_or_else(|| LinkError::UnknownNode(node.to_string()))?;

        let neighbours = self
            .config
            .topology
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(|target| {
                self.inboxes
                    .get(target)
                    .map(|(sender, _)| (target.clone(), sender.clone()))
            })
            .collect();

        Ok(SimulatedLink {
            node: node.to_string(),
            nodes: self.config.nodes.clone(),
            inbox: inbox.clone(),
            neighbours,
            noise: self.noise.clone(),
            transient_failure_probability: self.config.links.transient_failure_probability,
            receive_timeout: self.config.links.receive_timeout(),
            next_resource: Arc::clone(&self.next_resource),
            rng: self.link_rng(node),
            cancel,
            connected: false,
        })
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.inboxes.clear();
        info!(
            network = %self.config.name,
            resources = self.next_resource.load(Ordering::Relaxed),
            "Simulated network shut down"
        );
    }
}

/// Endpoint of one node in a [`SimulatedNetwork`].
pub struct SimulatedLink {
    node: String,
    nodes: Vec<String>,
    inbox: Receiver<SimQubit>,
    neighbours: HashMap<String, Sender<SimQubit>>,
    noise: Option<NoiseChannel>,
    transient_failure_probability: f64,
    receive_timeout: Duration,
    next_resource: Arc<AtomicU64>,
    rng: ChaCha8Rng,
    cancel: CancellationToken,
    connected: bool,
}

impl SimulatedLink {
    fn ensure_connected(&self) -> Result<(), LinkError> {
        if self.connected {
            Ok(())
        } else {
            Err(LinkError::Disconnected {
                node: self.node.clone(),
            })
        }
    }
}

fn prepare_state(kind: ResourceKind) -> Result<QuantumState, StateError> {
    let mut state = QuantumState::new(kind.qubits());
    let (h, cnot, cz) = (Gate::h(), Gate::cnot(), Gate::cz());

    match kind {
        ResourceKind::Single => {}
        ResourceKind::EprPair => {
            state.apply(&h, &[0])?;
            state.apply(&cnot, &[0, 1])?;
        }
        ResourceKind::FourPartite => {
            state.apply(&h, &[0])?;
            state.apply(&cnot, &[0, 1])?;
            state.apply(&h, &[2])?;
            state.apply(&cnot, &[2, 3])?;
            state.apply(&h, &[1])?;
            state.apply(&h, &[3])?;
            state.apply(&cnot, &[0, 3])?;
            state.apply(&cnot, &[1, 3])?;
            state.apply(&cz, &[0, 2])?;
            state.apply(&cz, &[1, 2])?;
        }
    }

    Ok(state)
}

impl QuantumLink for SimulatedLink {
    type Qubit = SimQubit;

    fn node(&self) -> &str {
        &self.node
    }

    fn connect(&mut self) -> Result<(), LinkError> {
        self.connected = true;
        debug!(node = %self.node, peers = self.neighbours.len(), "Link connected");
        Ok(())
    }

    fn prepare(&mut self, kind: ResourceKind) -> Result<Vec<SimQubit>, LinkError> {
        self.ensure_connected()?;
        if self.transient_failure_probability > 0.0
            && self.rng.random_bool(self.transient_failure_probability)
        {
            return Err(LinkError::ResourceUnavailable {
                node: self.node.clone(),
            });
        }

        let register = Arc::new(Mutex::new(prepare_state(kind)?));
        let resource = ResourceId(self.next_resource.fetch_add(1, Ordering::Relaxed));
        trace!(node = %self.node, %resource, ?kind, "Prepared resource");

        Ok((0..kind.qubits())
            .map(|slot| SimQubit {
                resource,
                slot,
                register: Arc::clone(&register),
            })
            .collect())
    }

    fn resource_id(&self, qubit: &SimQubit) -> ResourceId {
        qubit.resource
    }

    fn send(&mut self, qubit: SimQubit, destination: &str) -> Result<(), LinkError> {
        self.ensure_connected()?;
        let Some(sender) = self.neighbours.get(destination) else {
            return Err(if self.nodes.iter().any(|n| n == destination) {
                LinkError::NotAdjacent {
                    from: self.node.clone(),
                    to: destination.to_string(),
                }
            } else {
                LinkError::UnknownNode(destination.to_string())
            });
        };

        if let Some(noise) = &self.noise {
            qubit.register.lock().apply_noise(noise, &[qubit.slot])?;
        }

        trace!(from = %self.node, to = destination, resource = %qubit.resource, "Sending qubit");
        sender.send(qubit).map_err(|_| LinkError::Disconnected {
            node: destination.to_string(),
        })
    }

    fn receive(&mut self) -> Result<SimQubit, LinkError> {
        self.ensure_connected()?;
        let deadline = Instant::now() + self.receive_timeout;

        loop {
            if self.cancel.is_cancelled() {
                return Err(LinkError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(LinkError::Timeout {
                    node: self.node.clone(),
                    waited: self.receive_timeout,
                });
            }

            match self.inbox.recv_timeout(POLL_INTERVAL.min(deadline - now)) {
                Ok(qubit) => return Ok(qubit),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(LinkError::Disconnected {
                        node: self.node.clone(),
                    });
                }
            }
        }
    }

    fn apply_basis_transform(&mut self, qubit: &SimQubit, ops: &[Rotation]) -> Result<(), LinkError> {
        let mut state = qubit.register.lock();
        for op in ops {
            state.apply(&op.gate(), &[qubit.slot])?;
        }
        Ok(())
    }

    fn measure(&mut self, qubit: SimQubit) -> Result<u8, LinkError> {
        let result = qubit
            .register
            .lock()
            .measure(&Measurement::z_basis(), &[qubit.slot], &mut self.rng)?;
        Ok(result.value)
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        if self.connected {
            self.connected = false;
            debug!(node = %self.node, "Link disconnected");
        }
        Ok(())
    }
}
