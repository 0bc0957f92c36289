//! Per-device ordering gate
//!
//! A strict monotone gate on `sequenceId`: replays and regressions are
//! refused, gaps are accepted and never backfilled. There is no reorder buffer.
//!
//! A refused id is reported as a duplicate when the gate remembers accepting
//! it (the last `memory` accepted ids), and as out of order otherwise.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::SequenceError;

/// Counters kept alongside the gate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStats {
    pub accepted: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
    /// Total number of sequence ids skipped over by accepted frames
    pub missed: u64,
}

/// Ordering state for one device
#[derive(Debug, Clone)]
pub struct SequenceGate {
    last: Option<u64>,
    /// Recently accepted ids, ascending
    recent: VecDeque<u64>,
    memory: usize,
    stats: SequenceStats,
}

impl SequenceGate {
    /// Gate that only remembers the last accepted id
    pub fn new() -> Self {
        Self::with_memory(1)
    }

    /// Gate remembering the last `memory` accepted ids for duplicate detection
    pub fn with_memory(memory: usize) -> Self {
        let memory = memory.max(1);
        Self {
            last: None,
            recent: VecDeque::new(),
            memory,
            stats: SequenceStats::default(),
        }
    }

    /// Gate for a device whose first accepted frame carried `first`
    pub fn starting_at(first: u64, memory: usize) -> Self {
        let mut gate = Self::with_memory(memory);
        gate.recent.push_back(first);
        gate.last = Some(first);
        gate.stats.accepted = 1;
        gate
    }

    /// Highest accepted sequence id, `None` before first contact
    pub fn last(&self) -> Option<u64> {
        self.last
    }

    pub fn stats(&self) -> SequenceStats {
        self.stats
    }

    /// Admit or refuse `sequence_id`, advancing the gate on success
    pub fn admit(&mut self, sequence_id: u64) -> Result<(), SequenceError> {
        if let Some(last) = self.last {
            if sequence_id <= last {
                return Err(self.refuse(sequence_id, last));
            }
            self.stats.missed += sequence_id - last - 1;
        }

        if self.recent.len() >= self.memory {
            self.recent.pop_front();
        }
        self.recent.push_back(sequence_id);
        self.last = Some(sequence_id);
        self.stats.accepted += 1;
        Ok(())
    }

    fn refuse(&mut self, sequence_id: u64, last: u64) -> SequenceError {
        if self.recent.binary_search(&sequence_id).is_ok() {
            self.stats.duplicates += 1;
            SequenceError::Duplicate {
                received: sequence_id,
            }
        } else {
            self.stats.out_of_order += 1;
            SequenceError::OutOfOrder {
                received: sequence_id,
                last,
            }
        }
    }
}

impl Default for SequenceGate {
    fn default() -> Self {
        Self::new()
    }
}
