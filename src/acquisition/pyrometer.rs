//! Multiplexed pyrometer array.
//!
//! The multiplexer has a fixed number of channels. Each one is decided once
//! at startup: a calibrated channel votes for the rest of the run, a channel
//! whose calibration failed is excluded with its reason, and an unpopulated
//! channel is simply absent.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::PresenceSource;
use crate::config::defaults::MAX_PYROMETER_CHANNELS;
use crate::config::PyrometerConfig;
use crate::hardware::{
    offload, round_to, CalibrationError, HardwareError, PyrometerChannel, Shared, PYROMETER_DECIMALS,
};
use crate::types::SourceId;

pub enum ChannelSlot {
    Active {
        driver: Shared<dyn PyrometerChannel>,
        baseline: f64,
    },
    Excluded(String),
    Absent,
}

impl ChannelSlot {
    pub fn is_active(&self) -> bool {
        matches!(self, ChannelSlot::Active { .. })
    }
}

pub struct PyrometerArray {
    channels: [ChannelSlot; MAX_PYROMETER_CHANNELS],
    threshold: f64,
}

impl PyrometerArray {
    /// Calibrate every populated channel concurrently on the blocking pool.
    ///
    /// `drivers` is indexed by multiplexer channel. Channels that fail
    /// calibration are excluded, never fatal.
    pub async fn calibrate(
        drivers: Vec<Option<Shared<dyn PyrometerChannel>>>,
        config: &PyrometerConfig,
    ) -> Self {
        let samples = config.calibration_samples;
        let window: Duration = config.calibration_window();

        let pending: Vec<_> = drivers
            .into_iter()
            .take(MAX_PYROMETER_CHANNELS)
            .map(|slot| {
                slot.map(|driver| {
                    let worker = std::sync::Arc::clone(&driver);
                    let handle = tokio::task::spawn_blocking(move || {
                        crate::hardware::lock(&worker).calibrate(samples, window)
                    });
                    (driver, handle)
                })
            })
            .collect();

        let mut channels: [ChannelSlot; MAX_PYROMETER_CHANNELS] =
            std::array::from_fn(|_| ChannelSlot::Absent);
        for (ch, entry) in pending.into_iter().enumerate() {
            let Some((driver, handle)) = entry else {
                continue;
            };
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(CalibrationError::Hardware(HardwareError::WorkerJoin(e.to_string()))),
            };
            channels[ch] = match result {
                Ok(baseline) => {
                    info!(channel = ch, baseline, "[Pyrometer] Channel calibrated");
                    ChannelSlot::Active { driver, baseline }
                }
                Err(e) => {
                    warn!(channel = ch, error = %e, "[Pyrometer] Calibration failed, channel excluded for this run");
                    ChannelSlot::Excluded(e.to_string())
                }
            };
        }

        Self::from_slots(channels, config.threshold_c)
    }

    pub fn from_slots(channels: [ChannelSlot; MAX_PYROMETER_CHANNELS], threshold: f64) -> Self {
        Self {
            channels,
            threshold,
        }
    }

    pub fn active_channels(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_active())
            .map(|(ch, _)| ch)
            .collect()
    }

    pub fn excluded_channels(&self) -> Vec<(usize, &str)> {
        self.channels
            .iter()
            .enumerate()
            .filter_map(|(ch, slot)| match slot {
                ChannelSlot::Excluded(reason) => Some((ch, reason.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn baseline(&self, channel: usize) -> Option<f64> {
        match self.channels.get(channel)? {
            ChannelSlot::Active { baseline, .. } => Some(*baseline),
            _ => None,
        }
    }

    /// True when no channel can vote.
    pub fn is_empty(&self) -> bool {
        !self.channels.iter().any(ChannelSlot::is_active)
    }
}

#[async_trait]
impl PresenceSource for PyrometerArray {
    /// Positive as soon as one channel reads at least baseline + threshold.
    async fn poll_presence(&mut self) -> Result<bool, HardwareError> {
        let mut answered = 0usize;
        let mut last_error = None;

        for (ch, slot) in self.channels.iter().enumerate() {
            let ChannelSlot::Active { driver, baseline } = slot else {
                continue;
            };
            match offload(driver, |c| c.read_object_temperature()).await {
                Ok(reading) => {
                    answered += 1;
                    let reading = round_to(reading, PYROMETER_DECIMALS);
                    if reading >= baseline + self.threshold {
                        debug!(channel = ch, reading, baseline, "[Pyrometer] Channel above threshold");
                        return Ok(true);
                    }
                }
                Err(e) => {
                    debug!(channel = ch, error = %e, "[Pyrometer] Read failed, skipping channel");
                    last_error = Some(e);
                }
            }
        }

        match (answered, last_error) {
            (0, Some(e)) => Err(e),
            _ => Ok(false),
        }
    }

    fn source_id(&self) -> SourceId {
        SourceId::Pyrometer
    }
}
