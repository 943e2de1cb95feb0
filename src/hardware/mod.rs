//! Hardware collaborator seams.
//!
//! Drivers for the ultrasonic rangefinder, thermal array, pyrometers,
//! proximity switches and trapdoor motor are external to the controller.
//! Each is modelled as a synchronous, possibly blocking trait. The core
//! keeps every handle behind a [`Shared`] mutex and runs bus transactions
//! on tokio's blocking pool via [`offload`], so the cooperative scheduler
//! never stalls on I/O.
//!
//! Calibration numerics (baseline averaging) live in default trait methods
//! so real drivers only have to provide raw reads.

pub mod simulated;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::defaults::{THERMAL_HEIGHT, THERMAL_WIDTH};

// ============================================================================
// Error Types
// ============================================================================

/// Why a device could not be brought up at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitFailure {
    #[error("bus unavailable")]
    BusUnavailable,

    #[error("device not found")]
    DeviceNotFound,

    #[error("address conflict")]
    AddressConflict,
}

#[derive(Debug, Error)]
pub enum HardwareError {
    /// Construction failure. Fatal at startup.
    #[error("{device}: initialisation failed: {reason}")]
    Init { device: String, reason: InitFailure },

    /// A single sample was lost. Callers skip it and keep prior state.
    #[error("{device}: read failed: {message}")]
    ReadFailed { device: String, message: String },

    /// An actuator command was not applied.
    #[error("{device}: write failed: {message}")]
    WriteFailed { device: String, message: String },

    /// The blocking worker running the call was lost.
    #[error("hardware worker lost: {0}")]
    WorkerJoin(String),
}

impl HardwareError {
    pub fn init(device: impl Into<String>, reason: InitFailure) -> Self {
        Self::Init {
            device: device.into(),
            reason,
        }
    }

    pub fn read_failed(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReadFailed {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn write_failed(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Transient failures lose one sample and are never surfaced to the operator.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ReadFailed { .. })
    }
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("no frames captured during the calibration window")]
    NoFrames,

    #[error("no successful readings out of {attempted} samples")]
    NoSamples { attempted: usize },

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

// ============================================================================
// Thermal Frames
// ============================================================================

/// One fixed-size thermal image, row-major, in °C.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalFrame {
    cells: Vec<f64>,
}

impl ThermalFrame {
    pub const CELLS: usize = THERMAL_WIDTH * THERMAL_HEIGHT;

    /// Wrap raw cells. Returns `None` unless exactly [`Self::CELLS`] values are given.
    pub fn new(cells: Vec<f64>) -> Option<Self> {
        (cells.len() == Self::CELLS).then_some(Self { cells })
    }

    /// A uniform frame, e.g. an empty bay at ambient temperature.
    pub fn filled(value: f64) -> Self {
        Self {
            cells: vec![value; Self::CELLS],
        }
    }

    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < THERMAL_HEIGHT && col < THERMAL_WIDTH {
            self.cells.get(row * THERMAL_WIDTH + col).copied()
        } else {
            None
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        if row < THERMAL_HEIGHT && col < THERMAL_WIDTH {
            self.cells[row * THERMAL_WIDTH + col] = value;
        }
    }

    /// Number of cells more than `delta` °C above the same cell in `baseline`.
    pub fn cells_above(&self, baseline: &ThermalFrame, delta: f64) -> usize {
        self.cells
            .iter()
            .zip(&baseline.cells)
            .filter(|(now, base)| *now - *base > delta)
            .count()
    }
}

/// Decimal places a pyrometer reports; baselines and live readings are
/// compared at this precision.
pub const PYROMETER_DECIMALS: i32 = 2;

const THERMAL_BASELINE_DECIMALS: i32 = 1;

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Ultrasonic rangefinder pointed at the partition walls.
pub trait DistanceSensor: Send + 'static {
    /// Current distance in metres. May block for one echo round-trip.
    fn read(&mut self) -> Result<f64, HardwareError>;
}

/// Fixed-resolution thermal imaging array on the I2C bus.
pub trait ThermalArrayDriver: Send + 'static {
    fn capture_frame(&mut self) -> Result<ThermalFrame, HardwareError>;

    /// Average frames captured at `refresh_hz` over `window` into a baseline,
    /// rounded to 0.1 °C per cell.
    ///
    /// At least one capture is always attempted. Failed captures are dropped.
    fn calibrate(&mut self, window: Duration, refresh_hz: f64) -> Result<ThermalFrame, CalibrationError> {
        let period = Duration::try_from_secs_f64(1.0 / refresh_hz).unwrap_or(window);
        let started = Instant::now();
        let mut sums = vec![0.0; ThermalFrame::CELLS];
        let mut frames = 0usize;

        loop {
            match self.capture_frame() {
                Ok(frame) => {
                    for (sum, cell) in sums.iter_mut().zip(frame.cells()) {
                        *sum += cell;
                    }
                    frames += 1;
                }
                Err(e) => tracing::debug!(error = %e, "Dropping thermal frame during calibration"),
            }
            if started.elapsed() >= window {
                break;
            }
            std::thread::sleep(period);
        }

        if frames == 0 {
            return Err(CalibrationError::NoFrames);
        }
        let n = frames as f64;
        Ok(ThermalFrame {
            cells: sums
                .into_iter()
                .map(|s| round_to(s / n, THERMAL_BASELINE_DECIMALS))
                .collect(),
        })
    }
}

/// One single-point IR pyrometer behind the I2C multiplexer.
pub trait PyrometerChannel: Send + 'static {
    fn read_object_temperature(&mut self) -> Result<f64, HardwareError>;

    /// Mean of up to `samples` readings spread evenly over `window`, at the
    /// sensor's reporting precision.
    fn calibrate(&mut self, samples: usize, window: Duration) -> Result<f64, CalibrationError> {
        let spacing = window / u32::try_from(samples.max(1)).unwrap_or(u32::MAX);
        let mut readings = Vec::with_capacity(samples);
        for _ in 0..samples {
            match self.read_object_temperature() {
                Ok(t) if t.is_finite() => readings.push(t),
                Ok(t) => tracing::debug!(reading = t, "Dropping non-finite pyrometer reading"),
                Err(e) => tracing::debug!(error = %e, "Dropping pyrometer reading during calibration"),
            }
            std::thread::sleep(spacing);
        }
        if readings.is_empty() {
            return Err(CalibrationError::NoSamples { attempted: samples });
        }
        let mean = readings.iter().sum::<f64>() / readings.len() as f64;
        Ok(round_to(mean, PYROMETER_DECIMALS))
    }
}

/// Discrete digital input, e.g. an inductive proximity switch.
pub trait BinarySwitch: Send + 'static {
    fn read(&mut self) -> Result<bool, HardwareError>;
}

/// Bidirectional trapdoor motor. At most one direction is energised.
pub trait ActuatorDriver: Send + 'static {
    fn forward(&mut self) -> Result<(), HardwareError>;
    fn backward(&mut self) -> Result<(), HardwareError>;
    /// De-energise. Must be safe to call from any state.
    fn stop(&mut self) -> Result<(), HardwareError>;
}

// ============================================================================
// Shared Handles & Blocking Dispatch
// ============================================================================

/// A driver handle that can be moved onto the blocking pool.
pub type Shared<D> = Arc<Mutex<D>>;

pub fn shared<D>(driver: D) -> Shared<D> {
    Arc::new(Mutex::new(driver))
}

/// Lock a driver, recovering the guard if a previous holder panicked.
pub fn lock<D: ?Sized>(handle: &Mutex<D>) -> MutexGuard<'_, D> {
    handle.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Driver mutex poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Run `op` against the driver on the blocking pool and await its result.
///
/// The calling task suspends; other tasks keep running meanwhile.
pub async fn run_blocking<D, R, F>(handle: &Shared<D>, op: F) -> Result<R, HardwareError>
where
    D: ?Sized + Send + 'static,
    R: Send + 'static,
    F: FnOnce(&mut D) -> R + Send + 'static,
{
    let handle = Arc::clone(handle);
    tokio::task::spawn_blocking(move || {
        let mut guard = lock(&handle);
        op(&mut *guard)
    })
    .await
    .map_err(|e| HardwareError::WorkerJoin(e.to_string()))
}

/// [`run_blocking`] for driver calls that already return a `HardwareError`.
pub async fn offload<D, T, F>(handle: &Shared<D>, op: F) -> Result<T, HardwareError>
where
    D: ?Sized + Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut D) -> Result<T, HardwareError> + Send + 'static,
{
    run_blocking(handle, op).await?
}

impl<T: ActuatorDriver + ?Sized> ActuatorDriver for Box<T> {
    fn forward(&mut self) -> Result<(), HardwareError> {
        (**self).forward()
    }

    fn backward(&mut self) -> Result<(), HardwareError> {
        (**self).backward()
    }

    fn stop(&mut self) -> Result<(), HardwareError> {
        (**self).stop()
    }
}

// ============================================================================
// Rig
// ============================================================================

/// Every device handle the controller needs, constructed once at startup.
pub struct Rig {
    pub distance: Shared<dyn DistanceSensor>,
    /// `None` when the thermal array is disabled.
    pub thermal: Option<Shared<dyn ThermalArrayDriver>>,
    /// Indexed by multiplexer channel. `None` where no device answered.
    pub pyrometers: Vec<Option<Shared<dyn PyrometerChannel>>>,
    /// Proximity switches keyed by GPIO pin.
    pub switches: Vec<(u8, Shared<dyn BinarySwitch>)>,
    /// Owned outright by the actuation controller once the run starts.
    pub actuator: Box<dyn ActuatorDriver>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyPyrometer {
        script: Vec<Result<f64, ()>>,
    }

    impl PyrometerChannel for FlakyPyrometer {
        fn read_object_temperature(&mut self) -> Result<f64, HardwareError> {
            match self.script.pop() {
                Some(Ok(t)) => Ok(t),
                _ => Err(HardwareError::read_failed("pyro", "nack")),
            }
        }
    }

    struct ScriptedThermal {
        frames: Vec<Option<ThermalFrame>>,
    }

    impl ThermalArrayDriver for ScriptedThermal {
        fn capture_frame(&mut self) -> Result<ThermalFrame, HardwareError> {
            self.frames
                .pop()
                .flatten()
                .ok_or_else(|| HardwareError::read_failed("thermal", "frame error"))
        }
    }

    #[test]
    fn frame_rejects_wrong_size() {
        assert!(ThermalFrame::new(vec![0.0; 10]).is_none());
        assert!(ThermalFrame::new(vec![0.0; ThermalFrame::CELLS]).is_some());
    }

    #[test]
    fn cells_above_counts_strict_rise() {
        let base = ThermalFrame::filled(20.0);
        let mut frame = ThermalFrame::filled(20.0);
        frame.set(0, 0, 21.0);
        frame.set(1, 1, 20.5); // exactly at threshold: not counted
        frame.set(23, 31, 25.0);
        assert_eq!(frame.cells_above(&base, 0.5), 2);
    }

    #[test]
    fn pyrometer_calibration_skips_failed_reads() {
        let mut channel = FlakyPyrometer {
            script: vec![Ok(30.0), Err(()), Ok(20.0)],
        };
        let baseline = channel.calibrate(3, Duration::ZERO).unwrap();
        assert!((baseline - 25.0).abs() < 1e-9);
    }

    #[test]
    fn baselines_are_rounded_to_sensor_precision() {
        let mut channel = FlakyPyrometer {
            script: vec![Ok(20.004), Ok(20.004), Ok(20.004)],
        };
        assert_eq!(channel.calibrate(3, Duration::ZERO).unwrap(), 20.0);

        let mut driver = ScriptedThermal {
            frames: vec![Some(ThermalFrame::filled(21.04))],
        };
        let baseline = driver.calibrate(Duration::ZERO, 2.0).unwrap();
        assert!(baseline.cells().iter().all(|&c| c == 21.0));
    }

    #[test]
    fn zero_refresh_rate_still_captures_once() {
        let mut driver = ScriptedThermal {
            frames: vec![Some(ThermalFrame::filled(20.0))],
        };
        assert!(driver.calibrate(Duration::ZERO, 0.0).is_ok());
    }

    #[test]
    fn pyrometer_calibration_without_readings_fails() {
        let mut channel = FlakyPyrometer { script: vec![] };
        let err = channel.calibrate(4, Duration::ZERO).unwrap_err();
        assert!(matches!(err, CalibrationError::NoSamples { attempted: 4 }));
    }

    #[test]
    fn thermal_calibration_with_zero_window_captures_once() {
        let mut driver = ScriptedThermal {
            frames: vec![Some(ThermalFrame::filled(99.0)), Some(ThermalFrame::filled(21.0))],
        };
        let baseline = driver.calibrate(Duration::ZERO, 2.0).unwrap();
        assert_eq!(baseline.get(0, 0), Some(21.0));
    }

    #[test]
    fn thermal_calibration_without_frames_fails() {
        let mut driver = ScriptedThermal { frames: vec![None] };
        assert!(matches!(
            driver.calibrate(Duration::ZERO, 2.0),
            Err(CalibrationError::NoFrames)
        ));
    }

    #[tokio::test]
    async fn offload_returns_driver_result() {
        let handle: Shared<dyn PyrometerChannel> = shared(FlakyPyrometer {
            script: vec![Ok(42.0)],
        });
        let reading = offload(&handle, |c| c.read_object_temperature()).await.unwrap();
        assert_eq!(reading, 42.0);
        let second = offload(&handle, |c| c.read_object_temperature()).await;
        assert!(second.unwrap_err().is_transient());
    }
}
