//! Detector acquisition.
//!
//! Every detector, whatever its physics, collapses to one question asked on
//! its own schedule: "is metal under the sensors right now?". The
//! [`PresenceSource`] trait is that question; a [`Detector`] pairs a source
//! with its poll interval so the pipeline can run one identical task per
//! source.

pub mod proximity;
pub mod pyrometer;
pub mod thermal;

pub use proximity::ProximitySwitch;
pub use pyrometer::{ChannelSlot, PyrometerArray};
pub use thermal::ThermalDetector;

use async_trait::async_trait;
use std::time::Duration;

use crate::hardware::HardwareError;
use crate::types::SourceId;

/// A calibrated detector that can vote on metal presence.
#[async_trait]
pub trait PresenceSource: Send + 'static {
    /// Take one reading and decide. Blocking bus work is offloaded, so
    /// awaiting this never stalls other tasks.
    async fn poll_presence(&mut self) -> Result<bool, HardwareError>;

    fn source_id(&self) -> SourceId;
}

/// A source plus the cadence it is polled at.
pub struct Detector {
    pub source: Box<dyn PresenceSource>,
    pub poll_interval: Duration,
}

impl Detector {
    pub fn new(source: impl PresenceSource, poll_interval: Duration) -> Self {
        Self {
            source: Box::new(source),
            poll_interval,
        }
    }

    pub fn id(&self) -> SourceId {
        self.source.source_id()
    }
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("source", &self.id())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
