//! Six-slot occupancy record, one slot per partition.
//!
//! Votes OR into a slot: any number of positive votes for the same pass
//! leave a single `true`. The actuator clears a slot once its door cycle has
//! run. A slot remembers which pass it was consumed for, so an object still
//! under the sensors cannot re-arm the slot it was just ejected from.

use serde::Serialize;
use std::time::Instant;

use crate::config::defaults::PARTITION_COUNT;
use crate::types::PartitionIndex;

/// What a positive vote did to its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VoteOutcome {
    /// The slot went from clear to occupied.
    Marked,
    /// The slot was already occupied. Nothing changed.
    AlreadyMarked,
    /// The slot was already consumed for this pass. Vote dropped.
    AlreadyConsumed,
}

#[derive(Debug, Clone, Copy, Default)]
struct PartitionSlot {
    occupied: bool,
    last_write: Option<Instant>,
    /// Pass (crossing count) of the latest positive vote.
    armed_pass: Option<u64>,
    /// Pass the slot was last consumed for.
    consumed_pass: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotSnapshot {
    pub index: PartitionIndex,
    pub occupied: bool,
    pub armed_pass: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct OccupancyRing {
    slots: [PartitionSlot; PARTITION_COUNT],
}

impl OccupancyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a positive vote for `index`, cast during crossing `pass`.
    pub fn mark(&mut self, index: PartitionIndex, pass: u64, now: Instant) -> VoteOutcome {
        let slot = &mut self.slots[index.get()];
        if slot.consumed_pass == Some(pass) {
            return VoteOutcome::AlreadyConsumed;
        }
        slot.armed_pass = Some(pass);
        if slot.occupied {
            return VoteOutcome::AlreadyMarked;
        }
        slot.occupied = true;
        slot.last_write = Some(now);
        VoteOutcome::Marked
    }

    pub fn is_occupied(&self, index: PartitionIndex) -> bool {
        self.slots[index.get()].occupied
    }

    pub fn last_write(&self, index: PartitionIndex) -> Option<Instant> {
        self.slots[index.get()].last_write
    }

    /// Clear `index` after an actuation attempt. Returns whether it was set.
    pub fn consume(&mut self, index: PartitionIndex) -> bool {
        let slot = &mut self.slots[index.get()];
        let was_occupied = slot.occupied;
        slot.occupied = false;
        if let Some(pass) = slot.armed_pass.take() {
            slot.consumed_pass = Some(pass);
        }
        was_occupied
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.occupied).count()
    }

    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        PartitionIndex::all()
            .map(|index| {
                let slot = &self.slots[index.get()];
                SlotSnapshot {
                    index,
                    occupied: slot.occupied,
                    armed_pass: slot.armed_pass,
                }
            })
            .collect()
    }
}
