//! Core types shared by the tracker, aggregator and actuation controller.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::defaults::PARTITION_COUNT;

// ============================================================================
// Partition Identity
// ============================================================================

/// Index of one of the six carousel partitions.
///
/// All arithmetic wraps modulo [`PARTITION_COUNT`], so an out-of-ring value
/// cannot be constructed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PartitionIndex(u8);

impl PartitionIndex {
    pub const ZERO: Self = Self(0);

    /// Wrap any counter value onto the ring.
    pub fn new(raw: usize) -> Self {
        Self((raw % PARTITION_COUNT) as u8)
    }

    pub fn get(self) -> usize {
        usize::from(self.0)
    }

    /// The partition that follows this one past the sensors.
    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.get() + 1)
    }

    /// The partition `steps` positions earlier in the rotation.
    #[must_use]
    pub fn back(self, steps: usize) -> Self {
        Self::new(self.get() + PARTITION_COUNT - steps % PARTITION_COUNT)
    }

    /// Every partition, in ring order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..PARTITION_COUNT).map(Self::new)
    }
}

impl std::fmt::Display for PartitionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Actuator
// ============================================================================

/// Trapdoor actuation phase. Exactly one cycle may be in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActuatorState {
    #[default]
    Closed,
    Opening,
    Holding,
    Closing,
}

impl std::fmt::Display for ActuatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActuatorState::Closed => write!(f, "CLOSED"),
            ActuatorState::Opening => write!(f, "OPENING"),
            ActuatorState::Holding => write!(f, "HOLDING"),
            ActuatorState::Closing => write!(f, "CLOSING"),
        }
    }
}

// ============================================================================
// Detection
// ============================================================================

/// Identity of a detector that may vote on metal presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceId {
    Thermal,
    Pyrometer,
    Proximity { pin: u8 },
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceId::Thermal => write!(f, "thermal"),
            SourceId::Pyrometer => write!(f, "pyrometer"),
            SourceId::Proximity { pin } => write!(f, "proximity@gpio{pin}"),
        }
    }
}

/// One vote from one detector. Folded into the occupancy ring immediately.
#[derive(Debug, Clone, Copy)]
pub struct DetectionEvent {
    pub source: SourceId,
    pub at: Instant,
    pub positive: bool,
}

// ============================================================================
// Speed History
// ============================================================================

/// One interval-derived rotation-speed estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    pub speed: f64,
    pub at: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_wraps_modulo_six() {
        assert_eq!(PartitionIndex::new(6), PartitionIndex::ZERO);
        assert_eq!(PartitionIndex::new(13).get(), 1);
        assert_eq!(PartitionIndex::new(5).next(), PartitionIndex::ZERO);
    }

    #[test]
    fn back_steps_against_rotation() {
        assert_eq!(PartitionIndex::new(0).back(1).get(), 5);
        assert_eq!(PartitionIndex::new(4).back(2).get(), 2);
        assert_eq!(PartitionIndex::new(3).back(0).get(), 3);
        assert_eq!(PartitionIndex::new(3).back(6).get(), 3);
    }

    #[test]
    fn all_covers_ring_once() {
        let all: Vec<usize> = PartitionIndex::all().map(PartitionIndex::get).collect();
        assert_eq!(all, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn source_ids_render_for_logs() {
        assert_eq!(SourceId::Proximity { pin: 14 }.to_string(), "proximity@gpio14");
        assert_eq!(SourceId::Thermal.to_string(), "thermal");
    }
}
