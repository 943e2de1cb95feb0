//! Partition synchronisation and actuation core.
//!
//! - [`tracker`]: ultrasonic edge detection, partition index and speed
//! - [`occupancy`]: the six-slot occupancy ring
//! - [`state`]: the single lock domain shared by every task
//! - [`aggregator`]: folds detector votes into the ring
//! - [`actuation`]: the trapdoor state machine

pub mod actuation;
pub mod aggregator;
pub mod occupancy;
pub mod state;
pub mod tracker;

pub use actuation::{ActuationController, ActuationError, TickOutcome};
pub use aggregator::DetectionAggregator;
pub use occupancy::{OccupancyRing, SlotSnapshot, VoteOutcome};
pub use state::{Counters, SharedState, StateSnapshot, VoteRecord};
pub use tracker::{Crossing, EdgeEvent, PartitionTracker};
