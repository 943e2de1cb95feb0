//! Shared carousel state.
//!
//! The tracker, the occupancy ring and the run counters form one domain
//! behind one `std::sync::Mutex`. Every method takes the lock once, does its
//! whole read-modify-write and releases it before returning, so no caller can
//! hold it across an `.await` and no task ever sees a half-applied update.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::occupancy::{OccupancyRing, SlotSnapshot, VoteOutcome};
use super::tracker::{EdgeEvent, PartitionTracker};
use crate::config::{ExportConfig, TrackerConfig};
use crate::types::{DetectionEvent, PartitionIndex};

/// Run statistics, reported at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub votes_accepted: u64,
    pub votes_duplicate: u64,
    pub votes_after_consumption: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
}

/// A positive vote as it landed in the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteRecord {
    pub index: PartitionIndex,
    pub pass: u64,
    pub outcome: VoteOutcome,
}

/// Point-in-time copy of the shared state.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub current_index: PartitionIndex,
    pub export_index: PartitionIndex,
    pub crossings: u64,
    pub rotation_speed: Option<f64>,
    pub average_speed: Option<f64>,
    pub slots: Vec<SlotSnapshot>,
    pub counters: Counters,
}

#[derive(Debug)]
struct CarouselState {
    tracker: PartitionTracker,
    ring: OccupancyRing,
    counters: Counters,
}

#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<CarouselState>>,
    export_offset: usize,
}

impl SharedState {
    pub fn new(tracker: &TrackerConfig, export: &ExportConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CarouselState {
                tracker: PartitionTracker::new(tracker),
                ring: OccupancyRing::new(),
                counters: Counters::default(),
            })),
            export_offset: export.offset,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CarouselState> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Carousel state mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Feed one distance sample to the tracker.
    pub fn apply_distance(&self, distance: f64, now: Instant) -> EdgeEvent {
        self.lock().tracker.sample(distance, now)
    }

    /// Fold one detector vote into the slot currently under the sensors.
    ///
    /// Returns `None` for negative votes, which never touch the ring.
    pub fn record_vote(&self, event: &DetectionEvent) -> Option<VoteRecord> {
        if !event.positive {
            return None;
        }
        let mut guard = self.lock();
        let state = &mut *guard;
        let index = state.tracker.current_index();
        let pass = state.tracker.crossings();
        let outcome = state.ring.mark(index, pass, event.at);
        match outcome {
            VoteOutcome::Marked => state.counters.votes_accepted += 1,
            VoteOutcome::AlreadyMarked => state.counters.votes_duplicate += 1,
            VoteOutcome::AlreadyConsumed => state.counters.votes_after_consumption += 1,
        }
        Some(VoteRecord {
            index,
            pass,
            outcome,
        })
    }

    pub fn current_index(&self) -> PartitionIndex {
        self.lock().tracker.current_index()
    }

    /// Partition aligned with the trapdoor: the one that crossed the
    /// sensors `offset` steps ago.
    pub fn export_index(&self) -> PartitionIndex {
        self.lock().tracker.current_index().back(self.export_offset)
    }

    /// The export partition, if it is occupied.
    pub fn export_pending(&self) -> Option<PartitionIndex> {
        let state = self.lock();
        let index = state.tracker.current_index().back(self.export_offset);
        state.ring.is_occupied(index).then_some(index)
    }

    pub fn is_occupied(&self, index: PartitionIndex) -> bool {
        self.lock().ring.is_occupied(index)
    }

    /// Clear a slot after an actuation attempt, successful or not.
    pub fn consume(&self, index: PartitionIndex) -> bool {
        self.lock().ring.consume(index)
    }

    pub fn record_cycle(&self, completed: bool) {
        let mut state = self.lock();
        if completed {
            state.counters.cycles_completed += 1;
        } else {
            state.counters.cycles_failed += 1;
        }
    }

    pub fn crossings(&self) -> u64 {
        self.lock().tracker.crossings()
    }

    pub fn rotation_speed(&self) -> Option<f64> {
        self.lock().tracker.rotation_speed()
    }

    pub fn average_speed(&self) -> Option<f64> {
        self.lock().tracker.average_speed()
    }

    pub fn time_since_last_crossing(&self, now: Instant) -> Option<Duration> {
        self.lock().tracker.time_since_last_crossing(now)
    }

    pub fn counters(&self) -> Counters {
        self.lock().counters
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let state = self.lock();
        let current_index = state.tracker.current_index();
        StateSnapshot {
            current_index,
            export_index: current_index.back(self.export_offset),
            crossings: state.tracker.crossings(),
            rotation_speed: state.tracker.rotation_speed(),
            average_speed: state.tracker.average_speed(),
            slots: state.ring.snapshot(),
            counters: state.counters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceId;

    fn state_with_offset(offset: usize) -> SharedState {
        SharedState::new(
            &TrackerConfig::default(),
            &ExportConfig {
                offset,
                ..ExportConfig::default()
            },
        )
    }

    fn vote(positive: bool) -> DetectionEvent {
        DetectionEvent {
            source: SourceId::Thermal,
            at: Instant::now(),
            positive,
        }
    }

    fn advance(state: &SharedState, steps: usize) {
        let now = Instant::now();
        for _ in 0..steps {
            state.apply_distance(0.06, now);
            state.apply_distance(0.30, now);
        }
    }

    #[test]
    fn negative_votes_never_touch_the_ring() {
        let state = state_with_offset(0);
        assert!(state.record_vote(&vote(false)).is_none());
        assert_eq!(state.snapshot().slots.iter().filter(|s| s.occupied).count(), 0);
    }

    #[test]
    fn vote_lands_on_current_partition() {
        let state = state_with_offset(0);
        advance(&state, 2);
        let record = state.record_vote(&vote(true)).unwrap();
        assert_eq!(record.index.get(), 2);
        assert_eq!(record.pass, 2);
        assert_eq!(record.outcome, VoteOutcome::Marked);
        assert!(state.is_occupied(PartitionIndex::new(2)));
    }

    #[test]
    fn export_pending_with_zero_offset_is_current_slot() {
        let state = state_with_offset(0);
        advance(&state, 3);
        assert!(state.export_pending().is_none());
        state.record_vote(&vote(true));
        assert_eq!(state.export_pending(), Some(PartitionIndex::new(3)));
    }

    #[test]
    fn export_offset_delays_pending_until_partition_arrives() {
        let state = state_with_offset(2);
        advance(&state, 1);
        state.record_vote(&vote(true));
        assert!(state.export_pending().is_none());
        advance(&state, 1);
        assert!(state.export_pending().is_none());
        advance(&state, 1);
        assert_eq!(state.export_index().get(), 1);
        assert_eq!(state.export_pending(), Some(PartitionIndex::new(1)));
    }

    #[test]
    fn counters_track_vote_outcomes_and_cycles() {
        let state = state_with_offset(0);
        state.record_vote(&vote(true));
        state.record_vote(&vote(true));
        state.consume(PartitionIndex::ZERO);
        state.record_vote(&vote(true));
        state.record_cycle(true);
        state.record_cycle(false);

        let c = state.counters();
        assert_eq!(c.votes_accepted, 1);
        assert_eq!(c.votes_duplicate, 1);
        assert_eq!(c.votes_after_consumption, 1);
        assert_eq!(c.cycles_completed, 1);
        assert_eq!(c.cycles_failed, 1);
    }

    #[test]
    fn clones_share_one_domain() {
        let a = state_with_offset(0);
        let b = a.clone();
        advance(&a, 1);
        assert_eq!(b.current_index().get(), 1);
    }
}
