use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::errors::BarrierError;

/// Reusable rendezvous point for a fixed set of parties.
///
/// Each round every registered party calls [`RoundBarrier::wait`] once; all of
/// them are released together when the last one arrives, and the barrier
/// resets for the next round. A party that does not arrive within the timeout
/// breaks the barrier: every waiter (current and future) gets the same
/// [`BarrierError::Timeout`] naming the absent parties.
#[derive(Debug)]
pub struct RoundBarrier {
    parties: usize,
    timeout: Duration,
    state: Mutex<BarrierState>,
    released: Condvar,
}

#[derive(Debug)]
struct BarrierState {
    round: u64,
    arrived: Vec<bool>,
    waiting: usize,
    broken: Option<BarrierError>,
}

impl RoundBarrier {
    pub fn new(parties: usize, timeout: Duration) -> Self {
        Self {
            parties,
            timeout,
            state: Mutex::new(BarrierState {
                round: 0,
                arrived: vec![false; parties],
                waiting: 0,
                broken: None,
            }),
            released: Condvar::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Number of completed rounds.
    pub fn round(&self) -> u64 {
        self.state.lock().round
    }

    pub fn is_broken(&self) -> bool {
        self.state.lock().broken.is_some()
    }

    /// Blocks until all parties arrived for the current round.
    ///
    /// Returns the index of the round that was released.
    pub fn wait(&self, party: usize) -> Result<u64, BarrierError> {
        if party >= self.parties {
            return Err(BarrierError::UnknownParty {
                index: party,
                parties: self.parties,
            });
        }

        let mut state = self.state.lock();
        if let Some(err) = &state.broken {
            return Err(err.clone());
        }

        let round = state.round;
        if state.arrived[party] {
            return Err(BarrierError::DuplicateArrival { index: party, round });
        }
        state.arrived[party] = true;
        state.waiting += 1;

        if state.waiting == self.parties {
            state.arrived.fill(false);
            state.waiting = 0;
            state.round += 1;
            self.released.notify_all();
            return Ok(round);
        }

        let deadline = Instant::now() + self.timeout;
        while state.round == round {
            if let Some(err) = &state.broken {
                return Err(err.clone());
            }
            if self.released.wait_until(&mut state, deadline).timed_out() {
                if state.round != round {
                    break;
                }
                if let Some(err) = &state.broken {
                    return Err(err.clone());
                }
                let missing: Vec<usize> = state
                    .arrived
                    .iter()
                    .enumerate()
                    .filter(|(_, arrived)| !**arrived)
                    .map(|(index, _)| index)
                    .collect();
                warn!(round, ?missing, timeout = ?self.timeout, "Barrier timed out");
                let err = BarrierError::Timeout { round, missing };
                state.broken = Some(err.clone());
                self.released.notify_all();
                return Err(err);
            }
        }

        Ok(round)
    }

    /// Breaks the barrier, waking every waiter with [`BarrierError::Aborted`].
    ///
    /// A barrier that already timed out keeps its timeout error.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        if state.broken.is_none() {
            debug!(round = state.round, "Barrier aborted");
            state.broken = Some(BarrierError::Aborted);
        }
        self.released.notify_all();
    }
}
