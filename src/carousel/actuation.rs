//! Trapdoor actuation state machine.
//!
//! ```text
//! CLOSED --(export slot occupied)--> OPENING --open--> HOLDING --hold--> CLOSING --close--> CLOSED
//! ```
//!
//! The controller is driven by `tick(now)`. Only `Closed` looks at the
//! occupancy ring, so a cycle in flight can be neither re-triggered nor
//! pre-empted, and nothing is queued behind it. The triggering slot is
//! cleared once the cycle ends, successfully or not. Any failed motor
//! command de-energises the motor before the error is returned.

use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::state::SharedState;
use crate::config::ActuatorConfig;
use crate::hardware::{ActuatorDriver, HardwareError};
use crate::types::{ActuatorState, PartitionIndex};

#[derive(Debug, Error)]
#[error("actuation for partition {partition} failed entering {phase}: {source}")]
pub struct ActuationError {
    pub partition: PartitionIndex,
    /// Phase whose motor command failed.
    pub phase: ActuatorState,
    #[source]
    pub source: HardwareError,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Closed and nothing to export.
    Idle,
    /// A cycle started for this partition.
    Started(PartitionIndex),
    /// Moved to the next phase of the running cycle.
    Advanced(ActuatorState),
    /// Current phase has not elapsed yet.
    Waiting,
    /// The cycle finished and the slot was cleared.
    Completed(PartitionIndex),
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    open: Duration,
    hold: Duration,
    close: Duration,
}

pub struct ActuationController<A: ActuatorDriver> {
    driver: A,
    shared: SharedState,
    timing: Timing,
    phase: ActuatorState,
    phase_started: Instant,
    target: Option<PartitionIndex>,
    state_tx: watch::Sender<ActuatorState>,
    shut_down: bool,
}

impl<A: ActuatorDriver> ActuationController<A> {
    pub fn new(driver: A, shared: SharedState, config: &ActuatorConfig) -> Self {
        let (state_tx, _) = watch::channel(ActuatorState::Closed);
        Self {
            driver,
            shared,
            timing: Timing {
                open: config.open(),
                hold: config.hold(),
                close: config.close(),
            },
            phase: ActuatorState::Closed,
            phase_started: Instant::now(),
            target: None,
            state_tx,
            shut_down: false,
        }
    }

    /// Watch every phase transition.
    pub fn subscribe(&self) -> watch::Receiver<ActuatorState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ActuatorState {
        self.phase
    }

    /// Partition the running cycle is ejecting, if any.
    pub fn target(&self) -> Option<PartitionIndex> {
        self.target
    }

    pub fn driver(&self) -> &A {
        &self.driver
    }

    /// Total length of one open/hold/close cycle.
    pub fn cycle_duration(&self) -> Duration {
        self.timing.open + self.timing.hold + self.timing.close
    }

    /// Advance the state machine to `now`.
    pub fn tick(&mut self, now: Instant) -> Result<TickOutcome, ActuationError> {
        let elapsed = now.saturating_duration_since(self.phase_started);
        match self.phase {
            ActuatorState::Closed => {
                let Some(index) = self.shared.export_pending() else {
                    return Ok(TickOutcome::Idle);
                };
                self.target = Some(index);
                info!(partition = index.get(), "[Actuator] Export partition occupied, opening trapdoor");
                self.enter(ActuatorState::Opening, now, A::forward)?;
                Ok(TickOutcome::Started(index))
            }
            ActuatorState::Opening if elapsed >= self.timing.open => {
                self.enter(ActuatorState::Holding, now, A::stop)?;
                Ok(TickOutcome::Advanced(ActuatorState::Holding))
            }
            ActuatorState::Holding if elapsed >= self.timing.hold => {
                self.enter(ActuatorState::Closing, now, A::backward)?;
                Ok(TickOutcome::Advanced(ActuatorState::Closing))
            }
            ActuatorState::Closing if elapsed >= self.timing.close => {
                self.enter(ActuatorState::Closed, now, A::stop)?;
                let index = self.finish_cycle(true);
                info!(partition = index.get(), "[Actuator] Cycle complete, trapdoor closed");
                Ok(TickOutcome::Completed(index))
            }
            _ => Ok(TickOutcome::Waiting),
        }
    }

    fn enter(
        &mut self,
        next: ActuatorState,
        now: Instant,
        command: impl FnOnce(&mut A) -> Result<(), HardwareError>,
    ) -> Result<(), ActuationError> {
        if let Err(source) = command(&mut self.driver) {
            return Err(self.abort(next, source));
        }
        debug!(from = %self.phase, to = %next, "[Actuator] Phase transition");
        self.phase = next;
        self.phase_started = now;
        self.state_tx.send_replace(next);
        Ok(())
    }

    /// Stop the motor, drop back to `Closed` and clear the slot.
    fn abort(&mut self, phase: ActuatorState, source: HardwareError) -> ActuationError {
        if let Err(e) = self.driver.stop() {
            error!(error = %e, "[Actuator] Stop after failed command also failed");
        }
        self.phase = ActuatorState::Closed;
        self.state_tx.send_replace(ActuatorState::Closed);
        let partition = self.finish_cycle(false);
        ActuationError {
            partition,
            phase,
            source,
        }
    }

    fn finish_cycle(&mut self, completed: bool) -> PartitionIndex {
        let index = self.target.take().unwrap_or_default();
        self.shared.consume(index);
        self.shared.record_cycle(completed);
        index
    }

    /// De-energise the motor unconditionally. The last call of a run.
    pub fn shutdown(&mut self) -> Result<(), HardwareError> {
        if self.phase != ActuatorState::Closed {
            warn!(phase = %self.phase, "[Actuator] Shutdown interrupted a running cycle");
            self.finish_cycle(false);
            self.phase = ActuatorState::Closed;
            self.state_tx.send_replace(ActuatorState::Closed);
        }
        self.shut_down = true;
        self.driver.stop()
    }
}

impl<A: ActuatorDriver> Drop for ActuationController<A> {
    fn drop(&mut self) {
        if !self.shut_down {
            if let Err(e) = self.driver.stop() {
                error!(error = %e, "[Actuator] Failed to stop motor on drop");
            }
        }
    }
}
