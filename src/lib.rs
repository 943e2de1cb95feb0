//! Carousel Sorter: partition-synchronised metal sorting
//!
//! A six-partition carousel rotates continuously under a bank of detectors.
//! An ultrasonic rangefinder counts partition walls to know which partition
//! is under the sensors; detectors vote on metal presence into a per-partition
//! occupancy ring; a trapdoor fires once for each occupied partition as it
//! reaches the export position.
//!
//! ## Architecture
//!
//! - **Config**: TOML rig configuration with validated defaults
//! - **Hardware**: blocking driver traits plus a simulated rig
//! - **Acquisition**: thermal, pyrometer and proximity detectors
//! - **Carousel**: tracker, occupancy ring, aggregator and actuation state machine
//! - **Pipeline**: polling tasks and the supervisor that owns shutdown

pub mod acquisition;
pub mod carousel;
pub mod config;
pub mod hardware;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::SorterConfig;

// Re-export commonly used types
pub use types::{ActuatorState, DetectionEvent, PartitionIndex, SourceId, SpeedSample};

// Re-export the core
pub use carousel::{
    ActuationController, ActuationError, DetectionAggregator, EdgeEvent, OccupancyRing,
    PartitionTracker, SharedState, TickOutcome, VoteOutcome,
};

// Re-export hardware seams
pub use hardware::{
    ActuatorDriver, BinarySwitch, CalibrationError, DistanceSensor, HardwareError, InitFailure,
    PyrometerChannel, Rig, ThermalArrayDriver, ThermalFrame,
};

pub use pipeline::RunSummary;
