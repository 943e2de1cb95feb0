//! The polling tasks run by the supervisor.
//!
//! Every task has the same shape: wait for its next tick or for the stop
//! signal, then do one unit of work. Cancellation is only observed while
//! waiting, so a hardware call that has started always runs to completion.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::acquisition::Detector;
use crate::carousel::{ActuationController, DetectionAggregator, EdgeEvent, SharedState};
use crate::hardware::{offload, ActuatorDriver, DistanceSensor, Shared};
use crate::types::SourceId;

/// Identifies a finished task in supervisor logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskName {
    Tracker,
    Detector(SourceId),
    Actuator,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::Tracker => write!(f, "Tracker"),
            TaskName::Detector(id) => write!(f, "Detector({id})"),
            TaskName::Actuator => write!(f, "Actuator"),
        }
    }
}

/// Timestamp on the runtime clock, so paused-time tests stay consistent.
pub fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Wait for the next tick. Returns `false` once the stop signal fired.
async fn next_tick(interval: &mut tokio::time::Interval, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = interval.tick() => true,
    }
}

/// Sample the rangefinder and feed the tracker.
pub async fn run_tracker(
    sensor: Shared<dyn DistanceSensor>,
    state: SharedState,
    period: Duration,
    cancel: CancellationToken,
) -> Result<TaskName> {
    info!("[Tracker] Task starting");
    let mut interval = ticker(period);

    while next_tick(&mut interval, &cancel).await {
        let distance = match offload(&sensor, |s| s.read()).await {
            Ok(d) => d,
            Err(e) if e.is_transient() => {
                debug!(error = %e, "[Tracker] Distance read failed, sample skipped");
                continue;
            }
            Err(e) => return Err(anyhow!("[Tracker] rangefinder lost: {e}")),
        };

        match state.apply_distance(distance, now()) {
            EdgeEvent::Rising(crossing) => info!(
                partition = crossing.index.get(),
                crossings = crossing.count,
                speed = ?crossing.speed,
                "[Tracker] Partition crossing"
            ),
            EdgeEvent::Falling => debug!("[Tracker] Partition cleared"),
            EdgeEvent::Steady => {}
        }
    }

    info!("[Tracker] Shutdown signal received");
    Ok(TaskName::Tracker)
}

/// Poll one detector and forward positive votes to the aggregator.
///
/// A detector whose worker is lost retires; the others keep voting.
pub async fn run_detector(
    mut detector: Detector,
    aggregator: DetectionAggregator,
    cancel: CancellationToken,
) -> Result<TaskName> {
    let id = detector.id();
    info!(source = %id, interval_ms = detector.poll_interval.as_millis() as u64, "[Detector] Task starting");
    let mut interval = ticker(detector.poll_interval);

    while next_tick(&mut interval, &cancel).await {
        match detector.source.poll_presence().await {
            Ok(true) => {
                aggregator.report(id, true, now());
            }
            Ok(false) => {}
            Err(e) if e.is_transient() => {
                debug!(source = %id, error = %e, "[Detector] Read failed, vote skipped");
            }
            Err(e) => {
                warn!(source = %id, error = %e, "[Detector] Retiring detector");
                return Ok(TaskName::Detector(id));
            }
        }
    }

    debug!(source = %id, "[Detector] Shutdown signal received");
    Ok(TaskName::Detector(id))
}

/// Tick the actuation controller until stopped, then hand it back so the
/// supervisor can de-energise the motor as its last action.
pub async fn run_actuator<A: ActuatorDriver>(
    mut controller: ActuationController<A>,
    period: Duration,
    cancel: CancellationToken,
) -> ActuationController<A> {
    info!("[Actuator] Task starting");
    let mut interval = ticker(period);

    while next_tick(&mut interval, &cancel).await {
        if let Err(e) = controller.tick(now()) {
            error!(
                partition = e.partition.get(),
                phase = %e.phase,
                error = %e.source,
                "[Actuator] Cycle aborted, motor stopped, trapdoor assumed closed"
            );
        }
    }

    info!(state = %controller.state(), "[Actuator] Shutdown signal received");
    controller
}
