//! Task Pipeline
//!
//! ```text
//! Tracker task    (10 ms)  : rangefinder -> PartitionTracker -> current index
//! Detector tasks  (per src): thermal / pyrometer / proximity -> DetectionAggregator -> ring
//! Actuator task   (10 ms)  : ring[export index] -> ActuationController -> motor
//! ```
//!
//! All tasks share one [`SharedState`](crate::carousel::SharedState) and one
//! cancellation token. The supervisor owns startup ordering and shutdown.

pub mod supervisor;
pub mod tasks;

pub use supervisor::{build_detectors, run, DetectorSet, RunSummary};
pub use tasks::{now, run_actuator, run_detector, run_tracker, TaskName};
