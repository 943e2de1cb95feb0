//! System-wide default constants.
//!
//! Values match the deployed rig. Everything here can be
//! overridden from `sorter_config.toml` except the partition count.

// ============================================================================
// Carousel Geometry
// ============================================================================

/// Number of partitions on the carousel. Fixed by the hardware.
pub const PARTITION_COUNT: usize = 6;

// ============================================================================
// Partition Tracker
// ============================================================================

/// Distance from the ultrasonic sensor to a passing partition wall (m).
pub const PARTITION_DISTANCE_M: f64 = 0.06;

/// Acceptable deviation from [`PARTITION_DISTANCE_M`] for a wall to count as present (m).
pub const PARTITION_TOLERANCE_M: f64 = 0.04;

/// Ultrasonic sampling period (ms).
pub const TRACKER_SAMPLE_INTERVAL_MS: u64 = 10;

/// Number of interval-derived speed samples in the moving average (SAMPLES).
pub const SPEED_SAMPLES: usize = 5;

/// History multiplier: the speed history keeps `HISTORY_LENGTH * SAMPLES` entries.
pub const HISTORY_LENGTH: usize = 15;

/// Seconds-per-minute factor used by the rotation-speed conversion.
pub const SECONDS_PER_MINUTE: f64 = 60.0;

// ============================================================================
// Actuation
// ============================================================================

/// Trapdoor drive-open duration (ms).
pub const ACTUATOR_OPEN_MS: u64 = 500;

/// Pause with the door held open and the motor de-energised (ms).
pub const ACTUATOR_HOLD_MS: u64 = 1_250;

/// Trapdoor drive-closed duration (ms).
pub const ACTUATOR_CLOSE_MS: u64 = 1_000;

/// How often the actuation controller checks the export slot (ms).
pub const EXPORT_TICK_INTERVAL_MS: u64 = 10;

// ============================================================================
// Detectors
// ============================================================================

/// Thermal array resolution (MLX90640 class sensor).
pub const THERMAL_WIDTH: usize = 32;
pub const THERMAL_HEIGHT: usize = 24;

/// Thermal poll period (ms). Slower than the switches: one frame per refresh.
pub const THERMAL_POLL_INTERVAL_MS: u64 = 500;

/// Per-cell temperature rise over baseline that counts as "hot" (°C).
pub const THERMAL_DELTA_THRESHOLD_C: f64 = 0.5;

/// Hot cells required before the thermal array votes positive.
pub const THERMAL_MIN_POINTS: usize = 12;

/// Baseline averaging window for the thermal array (s).
pub const THERMAL_CALIBRATION_SECS: f64 = 6.0;

/// Upper bound on any calibration window (s).
pub const MAX_CALIBRATION_SECS: f64 = 3_600.0;

/// Thermal array refresh rate (Hz).
pub const THERMAL_REFRESH_HZ: f64 = 2.0;

/// Width of the pyrometer I2C multiplexer.
pub const MAX_PYROMETER_CHANNELS: usize = 8;

/// Pyrometer poll period (ms).
pub const PYROMETER_POLL_INTERVAL_MS: u64 = 500;

/// Rise over a channel's baseline that counts as a positive vote (°C).
pub const PYROMETER_THRESHOLD_C: f64 = 0.8;

/// Readings averaged per pyrometer channel during calibration.
pub const PYROMETER_CALIBRATION_SAMPLES: usize = 10;

/// Time span those readings are spread over (s).
pub const PYROMETER_CALIBRATION_WINDOW_SECS: f64 = 1.6;

/// Proximity switch poll period (ms).
pub const PROXIMITY_POLL_INTERVAL_MS: u64 = 100;

/// GPIO pins of the discrete proximity switches.
pub const PROXIMITY_PINS: [u8; 11] = [14, 15, 18, 23, 24, 25, 8, 7, 1, 12, 16];

// ============================================================================
// GPIO Assignment
// ============================================================================

pub const ULTRASONIC_ECHO_PIN: u8 = 10;
pub const ULTRASONIC_TRIGGER_PIN: u8 = 22;
pub const ACTUATOR_FORWARD_PIN: u8 = 21;
pub const ACTUATOR_BACKWARD_PIN: u8 = 20;

// ============================================================================
// Simulation
// ============================================================================

/// Carousel speed used by the simulated rig (rev/min).
pub const SIMULATION_RPM: f64 = 2.0;

/// Chance that a simulated partition carries metal on a given revolution.
pub const SIMULATION_METAL_PROBABILITY: f64 = 0.3;
