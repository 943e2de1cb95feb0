//! Supervisor: startup ordering, task monitoring and shutdown.
//!
//! Startup: build the shared state, calibrate every detector (a failed
//! calibration excludes that source), then spawn the tracker, one task per
//! detector and the actuator. Shutdown: cancel, drain every task so no
//! hardware call is left in flight, then stop the motor as the very last
//! hardware action. A trapdoor that can no longer fire ends the run.

use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::tasks::{run_actuator, run_detector, run_tracker, TaskName};
use crate::acquisition::{Detector, ProximitySwitch, PyrometerArray, ThermalDetector};
use crate::carousel::{ActuationController, Counters, DetectionAggregator, SharedState};
use crate::config::SorterConfig;
use crate::hardware::{BinarySwitch, PyrometerChannel, Rig, Shared, ThermalArrayDriver};

/// Outcome of one run, logged at shutdown and printable as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub rig: String,
    pub crossings: u64,
    pub average_speed: Option<f64>,
    pub counters: Counters,
    pub occupied_at_shutdown: usize,
    pub detectors: Vec<String>,
    pub excluded: Vec<String>,
}

impl RunSummary {
    fn log(&self) {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("📊 FINAL STATISTICS ({})", self.rig);
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("   Partition Crossings:  {}", self.crossings);
        match self.average_speed {
            Some(speed) => info!("   Average Speed:        {:.3}", speed),
            None => info!("   Average Speed:        n/a"),
        }
        info!("   Votes Accepted:       {}", self.counters.votes_accepted);
        info!("   Votes Duplicate:      {}", self.counters.votes_duplicate);
        info!("   Votes After Eject:    {}", self.counters.votes_after_consumption);
        info!("   Cycles Completed:     {}", self.counters.cycles_completed);
        info!("   Cycles Failed:        {}", self.counters.cycles_failed);
        info!("   Occupied At Shutdown: {}", self.occupied_at_shutdown);
        info!("   Detectors:            {}", self.detectors.join(", "));
        if !self.excluded.is_empty() {
            info!("   Excluded:             {}", self.excluded.join("; "));
        }
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
}

/// Calibrated detectors plus a description of every source that was left out.
pub struct DetectorSet {
    pub detectors: Vec<Detector>,
    pub excluded: Vec<String>,
}

/// Calibrate and wrap every enabled source.
pub async fn build_detectors(
    config: &SorterConfig,
    thermal: Option<Shared<dyn ThermalArrayDriver>>,
    pyrometers: Vec<Option<Shared<dyn PyrometerChannel>>>,
    switches: Vec<(u8, Shared<dyn BinarySwitch>)>,
) -> DetectorSet {
    let mut detectors = Vec::new();
    let mut excluded = Vec::new();

    if let Some(driver) = thermal {
        match ThermalDetector::calibrate(driver, &config.thermal).await {
            Ok(detector) => detectors.push(Detector::new(detector, config.thermal.poll_interval())),
            Err(e) => {
                warn!(error = %e, "[Thermal] Calibration failed, source excluded for this run");
                excluded.push(format!("thermal: {e}"));
            }
        }
    }

    if !pyrometers.is_empty() {
        let array = PyrometerArray::calibrate(pyrometers, &config.pyrometer).await;
        for (ch, reason) in array.excluded_channels() {
            excluded.push(format!("pyrometer ch{ch}: {reason}"));
        }
        if array.is_empty() {
            warn!("[Pyrometer] No channel calibrated, source excluded for this run");
        } else {
            info!(channels = ?array.active_channels(), "[Pyrometer] Array ready");
            detectors.push(Detector::new(array, config.pyrometer.poll_interval()));
        }
    }

    for (pin, switch) in switches {
        detectors.push(Detector::new(
            ProximitySwitch::new(pin, switch),
            config.proximity.poll_interval(),
        ));
    }

    DetectorSet {
        detectors,
        excluded,
    }
}

/// How supervision ended.
enum Supervised<C> {
    /// Stop requested or every polling task finished.
    Stopped,
    /// A polling task failed.
    Failed(anyhow::Error),
    /// The actuator task ended before the stop signal.
    ActuatorEnded(Result<C, JoinError>),
}

/// Monitor tasks until the stop signal fires or a task fails.
async fn run_supervisor<C>(
    task_set: &mut JoinSet<Result<TaskName>>,
    actuator: &mut JoinHandle<C>,
    cancel_token: &CancellationToken,
) -> Supervised<C> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                return Supervised::Stopped;
            }
            joined = &mut *actuator => {
                error!("🔒 Supervisor: Actuator task ended before shutdown");
                cancel_token.cancel();
                return Supervised::ActuatorEnded(joined);
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Supervised::Failed(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Supervised::Failed(anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All polling tasks completed");
                        return Supervised::Stopped;
                    }
                }
            }
        }
    }
}

/// Turn the actuator task's exit into the controller, or the reason it is gone.
fn reclaim<C>(joined: Result<C, JoinError>) -> Result<C> {
    joined.map_err(|e| anyhow!("Actuator task panicked: {}; motor stopped by controller drop", e))
}

/// Run the sorter on `rig` until `cancel` fires or a task fails.
///
/// The summary is logged however the run ends. An actuator task that dies
/// mid-run ends the whole run with an error.
pub async fn run(config: &SorterConfig, rig: Rig, cancel: CancellationToken) -> Result<RunSummary> {
    let Rig {
        distance,
        thermal,
        pyrometers,
        switches,
        actuator,
    } = rig;

    let state = SharedState::new(&config.tracker, &config.export);
    let aggregator = DetectionAggregator::new(state.clone());

    // Sources are calibrated before any polling task exists.
    let DetectorSet {
        detectors,
        excluded,
    } = build_detectors(config, thermal, pyrometers, switches).await;
    let detector_names: Vec<String> = detectors.iter().map(|d| d.id().to_string()).collect();
    if detectors.is_empty() {
        warn!("🔒 Supervisor: No detector available, the trapdoor will never fire");
    }

    let controller = ActuationController::new(actuator, state.clone(), &config.actuator);

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    task_set.spawn(run_tracker(
        distance,
        state.clone(),
        config.tracker.sample_interval(),
        cancel.clone(),
    ));
    for detector in detectors {
        task_set.spawn(run_detector(detector, aggregator.clone(), cancel.clone()));
    }
    let mut actuator_task = tokio::spawn(run_actuator(
        controller,
        config.export.tick_interval(),
        cancel.clone(),
    ));

    let supervised = run_supervisor(&mut task_set, &mut actuator_task, &cancel).await;

    // Drain: every task observes the signal at its next suspension point
    // and finishes whatever hardware call it had started.
    cancel.cancel();
    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task_name)) => info!("🔒 Supervisor: Task {} stopped", task_name),
            Ok(Err(e)) => warn!("🔒 Supervisor: Task ended with error during shutdown: {}", e),
            Err(e) => warn!("🔒 Supervisor: Task panicked during shutdown: {}", e),
        }
    }

    let (outcome, controller): (Result<()>, Option<_>) = match supervised {
        Supervised::Stopped => match reclaim(actuator_task.await) {
            Ok(controller) => (Ok(()), Some(controller)),
            Err(e) => (Err(e), None),
        },
        Supervised::Failed(e) => (Err(e), reclaim(actuator_task.await).ok()),
        Supervised::ActuatorEnded(joined) => match reclaim(joined) {
            Ok(controller) => (
                Err(anyhow!("Actuator task stopped before shutdown")),
                Some(controller),
            ),
            Err(e) => (Err(e), None),
        },
    };

    match controller {
        Some(mut controller) => match controller.shutdown() {
            Ok(()) => info!("[Actuator] Motor de-energised"),
            Err(e) => error!(error = %e, "[Actuator] Final stop command failed"),
        },
        None => error!("[Actuator] Controller lost; stop was issued when it was dropped"),
    }

    let snapshot = state.snapshot();
    let summary = RunSummary {
        rig: config.rig.name.clone(),
        crossings: snapshot.crossings,
        average_speed: snapshot.average_speed,
        counters: snapshot.counters,
        occupied_at_shutdown: snapshot.slots.iter().filter(|s| s.occupied).count(),
        detectors: detector_names,
        excluded,
    };
    summary.log();

    outcome.map(|()| summary)
}
