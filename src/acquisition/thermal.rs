//! Thermal array detector: hot-cell count against a calibrated baseline.

use async_trait::async_trait;

use super::PresenceSource;
use crate::config::ThermalConfig;
use crate::hardware::{
    offload, run_blocking, CalibrationError, Shared, ThermalArrayDriver, ThermalFrame,
};
use crate::types::SourceId;

pub struct ThermalDetector {
    driver: Shared<dyn ThermalArrayDriver>,
    baseline: ThermalFrame,
    delta_threshold: f64,
    min_points: usize,
}

impl ThermalDetector {
    /// Record a baseline of the empty bay, then return a ready detector.
    pub async fn calibrate(
        driver: Shared<dyn ThermalArrayDriver>,
        config: &ThermalConfig,
    ) -> Result<Self, CalibrationError> {
        let window = config.calibration_window();
        let refresh_hz = config.refresh_hz;
        tracing::info!(
            window_secs = window.as_secs_f64(),
            "[Thermal] Calibrating baseline, keep the bay empty"
        );
        let baseline = run_blocking(&driver, move |d| d.calibrate(window, refresh_hz)).await??;
        Ok(Self::with_baseline(driver, baseline, config))
    }

    pub fn with_baseline(
        driver: Shared<dyn ThermalArrayDriver>,
        baseline: ThermalFrame,
        config: &ThermalConfig,
    ) -> Self {
        Self {
            driver,
            baseline,
            delta_threshold: config.delta_threshold_c,
            min_points: config.min_points,
        }
    }

    pub fn baseline(&self) -> &ThermalFrame {
        &self.baseline
    }
}

#[async_trait]
impl PresenceSource for ThermalDetector {
    async fn poll_presence(&mut self) -> Result<bool, crate::hardware::HardwareError> {
        let frame = offload(&self.driver, |d| d.capture_frame()).await?;
        let hot = frame.cells_above(&self.baseline, self.delta_threshold);
        tracing::trace!(hot, "[Thermal] Frame evaluated");
        Ok(hot >= self.min_points)
    }

    fn source_id(&self) -> SourceId {
        SourceId::Thermal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{shared, HardwareError};
    use std::time::Duration;

    struct FixedFrames {
        frame: Option<ThermalFrame>,
    }

    impl ThermalArrayDriver for FixedFrames {
        fn capture_frame(&mut self) -> Result<ThermalFrame, HardwareError> {
            self.frame
                .clone()
                .ok_or_else(|| HardwareError::read_failed("thermal", "i2c timeout"))
        }
    }

    fn config() -> ThermalConfig {
        ThermalConfig {
            calibration_secs: 0.0,
            ..ThermalConfig::default()
        }
    }

    fn hot_frame(cells: usize) -> ThermalFrame {
        let mut frame = ThermalFrame::filled(20.0);
        for i in 0..cells {
            frame.set(i / 32, i % 32, 22.0);
        }
        frame
    }

    #[tokio::test]
    async fn votes_positive_at_min_points() {
        let driver: Shared<dyn ThermalArrayDriver> = shared(FixedFrames {
            frame: Some(hot_frame(12)),
        });
        let mut detector =
            ThermalDetector::with_baseline(driver, ThermalFrame::filled(20.0), &config());
        assert!(detector.poll_presence().await.unwrap());
    }

    #[tokio::test]
    async fn votes_negative_below_min_points() {
        let driver: Shared<dyn ThermalArrayDriver> = shared(FixedFrames {
            frame: Some(hot_frame(11)),
        });
        let mut detector =
            ThermalDetector::with_baseline(driver, ThermalFrame::filled(20.0), &config());
        assert!(!detector.poll_presence().await.unwrap());
    }

    #[tokio::test]
    async fn calibration_uses_captured_frames() {
        let driver: Shared<dyn ThermalArrayDriver> = shared(FixedFrames {
            frame: Some(ThermalFrame::filled(19.5)),
        });
        let detector = ThermalDetector::calibrate(driver, &config()).await.unwrap();
        assert_eq!(detector.baseline().get(0, 0), Some(19.5));
        assert_eq!(config().calibration_window(), Duration::ZERO);
    }

    #[tokio::test]
    async fn calibration_fails_without_frames() {
        let driver: Shared<dyn ThermalArrayDriver> = shared(FixedFrames { frame: None });
        let result = ThermalDetector::calibrate(driver, &config()).await;
        assert!(matches!(result, Err(CalibrationError::NoFrames)));
    }

    #[tokio::test]
    async fn read_failure_is_transient() {
        let driver: Shared<dyn ThermalArrayDriver> = shared(FixedFrames { frame: None });
        let mut detector =
            ThermalDetector::with_baseline(driver, ThermalFrame::filled(20.0), &config());
        assert!(detector.poll_presence().await.unwrap_err().is_transient());
    }
}
