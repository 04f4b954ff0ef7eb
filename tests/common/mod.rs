#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use qprotocols::errors::LinkError;
use qprotocols::network::{SimQubit, SimulatedLink};
use qprotocols::{
    CancellationToken, NetworkConfig, QuantumLink, QuantumNetwork, ResourceId, ResourceKind, Rotation,
    SimulatedNetwork,
};

/// Simulated network with injectable faults and a shutdown counter.
pub struct FaultyNetwork {
    inner: SimulatedNetwork,
    slow_connect: Option<(String, Duration)>,
    fail_receive: Option<(String, usize)>,
    pub shutdowns: Arc<AtomicUsize>,
}

impl FaultyNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            inner: SimulatedNetwork::new(config).unwrap(),
            slow_connect: None,
            fail_receive: None,
            shutdowns: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delays `node`'s connection by `delay`.
    pub fn with_slow_connect(mut self, node: &str, delay: Duration) -> Self {
        self.slow_connect = Some((node.to_string(), delay));
        self
    }

    /// Makes the `nth` receive of `node` (0-based) fail.
    pub fn with_failed_receive(mut self, node: &str, nth: usize) -> Self {
        self.fail_receive = Some((node.to_string(), nth));
        self
    }

    pub fn shutdown_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.shutdowns)
    }
}

impl QuantumNetwork for FaultyNetwork {
    type Link = FaultyLink;

    fn has_node(&self, node: &str) -> bool {
        self.inner.has_node(node)
    }

    fn is_adjacent(&self, from: &str, to: &str) -> bool {
        self.inner.is_adjacent(from, to)
    }

    fn link(&self, node: &str, cancel: CancellationToken) -> Result<FaultyLink, LinkError> {
        Ok(FaultyLink {
            inner: self.inner.link(node, cancel)?,
            connect_delay: fault_for(&self.slow_connect, node),
            fail_receive_at: fault_for(&self.fail_receive, node),
            receives: 0,
        })
    }

    fn shutdown(&mut self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.inner.shutdown();
    }
}

fn fault_for<T: Copy>(fault: &Option<(String, T)>, node: &str) -> Option<T> {
    fault.as_ref().filter(|(n, _)| n == node).map(|(_, v)| *v)
}

pub struct FaultyLink {
    inner: SimulatedLink,
    connect_delay: Option<Duration>,
    fail_receive_at: Option<usize>,
    receives: usize,
}

impl QuantumLink for FaultyLink {
    type Qubit = SimQubit;

    fn node(&self) -> &str {
        self.inner.node()
    }

    fn connect(&mut self) -> Result<(), LinkError> {
        if let Some(delay) = self.connect_delay {
            thread::sleep(delay);
        }
        self.inner.connect()
    }

    fn prepare(&mut self, kind: ResourceKind) -> Result<Vec<SimQubit>, LinkError> {
        self.inner.prepare(kind)
    }

    fn resource_id(&self, qubit: &SimQubit) -> ResourceId {
        self.inner.resource_id(qubit)
    }

    fn send(&mut self, qubit: SimQubit, destination: &str) -> Result<(), LinkError> {
        self.inner.send(qubit, destination)
    }

    fn receive(&mut self) -> Result<SimQubit, LinkError> {
        let nth = self.receives;
        self.receives += 1;
        if self.fail_receive_at == Some(nth) {
            return Err(LinkError::Disconnected {
                node: self.inner.node().to_string(),
            });
        }
        self.inner.receive()
    }

    fn apply_basis_transform(&mut self, qubit: &SimQubit, ops: &[Rotation]) -> Result<(), LinkError> {
        self.inner.apply_basis_transform(qubit, ops)
    }

    fn measure(&mut self, qubit: SimQubit) -> Result<u8, LinkError> {
        self.inner.measure(qubit)
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        self.inner.disconnect()
    }
}
