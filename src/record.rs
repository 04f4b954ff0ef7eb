use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a quantum resource (a prepared qubit or entangled group).
///
/// Parties holding qubits of the same resource in the same round must record
/// the same id; statistics rely on it to check alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Basis chosen by a party in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BasisChoice<B> {
    /// Position of `basis` in the party's basis set
    pub setting: u8,
    pub basis: B,
}

/// What one party observed in one round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord<B> {
    pub round_index: usize,
    /// `None` for roles that make no basis choice
    pub chosen_basis: Option<BasisChoice<B>>,
    /// Measured or encoded bit, `None` when the role neither measures nor encodes
    pub outcome: Option<u8>,
    pub resource_id: Option<ResourceId>,
}

/// Per-party, append-only store of round records.
///
/// Sized for the whole run up front and written only by its owning party.
/// Once the coordinator hands it back the buffer is read-only.
#[derive(Debug, Clone, Serialize)]
pub struct ResultBuffer<B> {
    party: String,
    capacity: usize,
    records: Vec<RoundRecord<B>>,
}

impl<B> ResultBuffer<B> {
    pub fn new(party: impl Into<String>, capacity: usize) -> Self {
        Self {
            party: party.into(),
            capacity,
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn party(&self) -> &str {
        &self.party
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every round up to the capacity has been recorded.
    pub fn is_complete(&self) -> bool {
        self.records.len() == self.capacity
    }

    /// Index the next appended record will carry.
    pub fn next_round(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[RoundRecord<B>] {
        &self.records
    }

    pub fn get(&self, round: usize) -> Option<&RoundRecord<B>> {
        self.records.get(round)
    }

    pub(crate) fn push(&mut self, record: RoundRecord<B>) {
        debug_assert_eq!(record.round_index, self.records.len(), "rounds must be gapless");
        debug_assert!(self.records.len() < self.capacity, "buffer over capacity");
        self.records.push(record);
    }

    pub fn outcomes(&self) -> impl Iterator<Item = Option<u8>> + '_ {
        self.records.iter().map(|r| r.outcome)
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = Option<ResourceId>> + '_ {
        self.records.iter().map(|r| r.resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(round_index: usize, outcome: u8) -> RoundRecord<()> {
        RoundRecord {
            round_index,
            chosen_basis: None,
            outcome: Some(outcome),
            resource_id: Some(ResourceId(round_index as u64)),
        }
    }

    #[test]
    fn buffer_completes_at_capacity() {
        let mut buffer = ResultBuffer::new("alice", 3);
        assert!(buffer.is_empty());
        for round in 0..3 {
            assert!(!buffer.is_complete());
            buffer.push(record(round, (round % 2) as u8));
        }
        assert!(buffer.is_complete());
        assert_eq!(buffer.outcomes().collect::<Vec<_>>(), vec![Some(0), Some(1), Some(0)]);
        assert_eq!(buffer.get(2).map(|r| r.round_index), Some(2));
    }

    #[test]
    fn resource_id_display() {
        assert_eq!(ResourceId(17).to_string(), "#17");
    }
}
