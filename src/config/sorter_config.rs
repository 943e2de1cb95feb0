//! Sorter Configuration - rig timing, thresholds and wiring as TOML values
//!
//! Each struct implements `Default` with the deployed rig's values, so a
//! missing config file gives the same behaviour as the bench setup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one carousel sorter.
///
/// Load with `SorterConfig::load()` which searches:
/// 1. `$CAROUSEL_CONFIG` env var
/// 2. `./sorter_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SorterConfig {
    /// Rig identification
    #[serde(default)]
    pub rig: RigInfo,

    /// Ultrasonic partition tracking
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Position of the trapdoor relative to the sensing zone
    #[serde(default)]
    pub export: ExportConfig,

    /// Trapdoor actuator wiring and cycle timing
    #[serde(default)]
    pub actuator: ActuatorConfig,

    /// Thermal imaging array
    #[serde(default)]
    pub thermal: ThermalConfig,

    /// Multi-channel pyrometer array
    #[serde(default)]
    pub pyrometer: PyrometerConfig,

    /// Discrete proximity switches
    #[serde(default)]
    pub proximity: ProximityConfig,

    /// Simulated rig used when no hardware is attached
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "CAROUSEL_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "sorter_config.toml";

impl SorterConfig {
    /// Load configuration using the standard search order:
    /// 1. `$CAROUSEL_CONFIG` environment variable
    /// 2. `./sorter_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), rig = %config.rig.name, "Loaded sorter config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(rig = %config.rig.name, "Loaded sorter config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found — using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys are reported as warnings; they never fail the load.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        for w in &super::validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        for w in &super::validation::validate_physical_ranges(&config) {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - Durations and poll intervals must be positive
    /// - Calibration windows must lie within an hour
    /// - The hysteresis band must not reach zero distance
    /// - Moving-average window and history multiplier must be >= 1
    /// - The export offset must name a partition
    /// - GPIO pins must not be shared between devices
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let t = &self.tracker;
        Self::check_finite_positive(t.partition_distance_m, "tracker.partition_distance_m", &mut errors);
        Self::check_finite_positive(t.tolerance_m, "tracker.tolerance_m", &mut errors);
        if t.tolerance_m >= t.partition_distance_m {
            errors.push(format!(
                "tracker.tolerance_m ({:.3}) must be less than partition_distance_m ({:.3})",
                t.tolerance_m, t.partition_distance_m
            ));
        }
        if t.speed_samples == 0 {
            errors.push("tracker.speed_samples must be > 0".to_string());
        }
        if t.history_length == 0 {
            errors.push("tracker.history_length must be > 0".to_string());
        }

        if self.export.offset >= defaults::PARTITION_COUNT {
            errors.push(format!(
                "export.offset ({}) must be less than the partition count ({})",
                self.export.offset,
                defaults::PARTITION_COUNT
            ));
        }

        let a = &self.actuator;
        for (value, name) in [
            (a.open_ms, "actuator.open_ms"),
            (a.close_ms, "actuator.close_ms"),
            (t.sample_interval_ms, "tracker.sample_interval_ms"),
            (self.export.tick_interval_ms, "export.tick_interval_ms"),
            (self.thermal.poll_interval_ms, "thermal.poll_interval_ms"),
            (self.pyrometer.poll_interval_ms, "pyrometer.poll_interval_ms"),
            (self.proximity.poll_interval_ms, "proximity.poll_interval_ms"),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be > 0"));
            }
        }

        let th = &self.thermal;
        Self::check_finite_positive(th.refresh_hz, "thermal.refresh_hz", &mut errors);
        Self::check_calibration_window(th.calibration_secs, "thermal.calibration_secs", &mut errors);
        if !th.delta_threshold_c.is_finite() {
            errors.push("thermal.delta_threshold_c must be finite".to_string());
        }
        if th.min_points == 0 || th.min_points > defaults::THERMAL_WIDTH * defaults::THERMAL_HEIGHT {
            errors.push(format!(
                "thermal.min_points must be in 1..={} (got {})",
                defaults::THERMAL_WIDTH * defaults::THERMAL_HEIGHT,
                th.min_points
            ));
        }

        let p = &self.pyrometer;
        if !(1..=defaults::MAX_PYROMETER_CHANNELS).contains(&p.channels) {
            errors.push(format!(
                "pyrometer.channels must be in 1..={} (got {})",
                defaults::MAX_PYROMETER_CHANNELS,
                p.channels
            ));
        }
        if p.calibration_samples == 0 {
            errors.push("pyrometer.calibration_samples must be > 0".to_string());
        }
        if !p.threshold_c.is_finite() {
            errors.push("pyrometer.threshold_c must be finite".to_string());
        }
        Self::check_calibration_window(
            p.calibration_window_secs,
            "pyrometer.calibration_window_secs",
            &mut errors,
        );

        let s = &self.simulation;
        Self::check_finite_positive(s.rpm, "simulation.rpm", &mut errors);
        if !(0.0..=1.0).contains(&s.metal_probability) {
            errors.push(format!(
                "simulation.metal_probability must be in 0.0..=1.0 (got {})",
                s.metal_probability
            ));
        }

        let mut seen = HashSet::new();
        for (pin, owner) in self.gpio_assignments() {
            if !seen.insert(pin) {
                errors.push(format!("GPIO pin {pin} assigned more than once (again by {owner})"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Every GPIO pin claimed by the configuration, with the claiming device.
    pub fn gpio_assignments(&self) -> Vec<(u8, String)> {
        let mut pins = vec![
            (self.tracker.echo_pin, "ultrasonic echo".to_string()),
            (self.tracker.trigger_pin, "ultrasonic trigger".to_string()),
            (self.actuator.forward_pin, "actuator forward".to_string()),
            (self.actuator.backward_pin, "actuator backward".to_string()),
        ];
        if self.proximity.enabled {
            pins.extend(
                self.proximity
                    .pins
                    .iter()
                    .map(|&pin| (pin, format!("proximity switch {pin}"))),
            );
        }
        pins
    }

    fn check_calibration_window(secs: f64, name: &str, errors: &mut Vec<String>) {
        if !(0.0..=defaults::MAX_CALIBRATION_SECS).contains(&secs) {
            errors.push(format!(
                "{name} must be in 0..={} seconds (got {secs})",
                defaults::MAX_CALIBRATION_SECS
            ));
        }
    }

    fn check_finite_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{name} must be a positive finite number (got {value})"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Clamped into the validated range; NaN maps to zero.
fn calibration_window(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, defaults::MAX_CALIBRATION_SECS)).unwrap_or_default()
}

// ============================================================================
// Rig Info
// ============================================================================

/// Identification metadata — appears in logs only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigInfo {
    #[serde(default = "default_rig_name")]
    pub name: String,
}

fn default_rig_name() -> String {
    "DEFAULT".to_string()
}

impl Default for RigInfo {
    fn default() -> Self {
        Self {
            name: default_rig_name(),
        }
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// Ultrasonic partition-wall detection and speed estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Wall distance at the centre of the hysteresis band (m)
    #[serde(default = "default_partition_distance")]
    pub partition_distance_m: f64,

    /// Half-width of the hysteresis band (m)
    #[serde(default = "default_tolerance")]
    pub tolerance_m: f64,

    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Moving-average window (SAMPLES)
    #[serde(default = "default_speed_samples")]
    pub speed_samples: usize,

    /// History multiplier (HISTORY_LENGTH)
    #[serde(default = "default_history_length")]
    pub history_length: usize,

    #[serde(default = "default_echo_pin")]
    pub echo_pin: u8,

    #[serde(default = "default_trigger_pin")]
    pub trigger_pin: u8,
}

fn default_partition_distance() -> f64 {
    defaults::PARTITION_DISTANCE_M
}
fn default_tolerance() -> f64 {
    defaults::PARTITION_TOLERANCE_M
}
fn default_sample_interval_ms() -> u64 {
    defaults::TRACKER_SAMPLE_INTERVAL_MS
}
fn default_speed_samples() -> usize {
    defaults::SPEED_SAMPLES
}
fn default_history_length() -> usize {
    defaults::HISTORY_LENGTH
}
fn default_echo_pin() -> u8 {
    defaults::ULTRASONIC_ECHO_PIN
}
fn default_trigger_pin() -> u8 {
    defaults::ULTRASONIC_TRIGGER_PIN
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            partition_distance_m: default_partition_distance(),
            tolerance_m: default_tolerance(),
            sample_interval_ms: default_sample_interval_ms(),
            speed_samples: default_speed_samples(),
            history_length: default_history_length(),
            echo_pin: default_echo_pin(),
            trigger_pin: default_trigger_pin(),
        }
    }
}

impl TrackerConfig {
    pub fn sample_interval(&self) -> Duration {
        millis(self.sample_interval_ms)
    }

    /// Capacity of the speed history buffer.
    pub fn history_capacity(&self) -> usize {
        self.history_length * self.speed_samples
    }
}

// ============================================================================
// Export
// ============================================================================

/// Where the trapdoor sits relative to the sensing zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Partitions between the sensing zone and the trapdoor.
    /// `0` means the trapdoor is directly under the sensors.
    #[serde(default)]
    pub offset: usize,

    #[serde(default = "default_export_tick_ms")]
    pub tick_interval_ms: u64,
}

fn default_export_tick_ms() -> u64 {
    defaults::EXPORT_TICK_INTERVAL_MS
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            offset: 0,
            tick_interval_ms: default_export_tick_ms(),
        }
    }
}

impl ExportConfig {
    pub fn tick_interval(&self) -> Duration {
        millis(self.tick_interval_ms)
    }
}

// ============================================================================
// Actuator
// ============================================================================

/// Bidirectional trapdoor motor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    #[serde(default = "default_forward_pin")]
    pub forward_pin: u8,

    #[serde(default = "default_backward_pin")]
    pub backward_pin: u8,

    /// Forward drive time (door opening)
    #[serde(default = "default_open_ms")]
    pub open_ms: u64,

    /// De-energised pause with the door open
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,

    /// Backward drive time (door closing)
    #[serde(default = "default_close_ms")]
    pub close_ms: u64,
}

fn default_forward_pin() -> u8 {
    defaults::ACTUATOR_FORWARD_PIN
}
fn default_backward_pin() -> u8 {
    defaults::ACTUATOR_BACKWARD_PIN
}
fn default_open_ms() -> u64 {
    defaults::ACTUATOR_OPEN_MS
}
fn default_hold_ms() -> u64 {
    defaults::ACTUATOR_HOLD_MS
}
fn default_close_ms() -> u64 {
    defaults::ACTUATOR_CLOSE_MS
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            forward_pin: default_forward_pin(),
            backward_pin: default_backward_pin(),
            open_ms: default_open_ms(),
            hold_ms: default_hold_ms(),
            close_ms: default_close_ms(),
        }
    }
}

impl ActuatorConfig {
    pub fn open(&self) -> Duration {
        millis(self.open_ms)
    }
    pub fn hold(&self) -> Duration {
        millis(self.hold_ms)
    }
    pub fn close(&self) -> Duration {
        millis(self.close_ms)
    }
}

// ============================================================================
// Thermal Array
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_thermal_poll_ms")]
    pub poll_interval_ms: u64,

    /// Per-cell rise over baseline that marks the cell hot (°C)
    #[serde(default = "default_thermal_delta")]
    pub delta_threshold_c: f64,

    /// Hot cells needed for a positive vote
    #[serde(default = "default_thermal_min_points")]
    pub min_points: usize,

    #[serde(default = "default_thermal_calibration_secs")]
    pub calibration_secs: f64,

    #[serde(default = "default_thermal_refresh_hz")]
    pub refresh_hz: f64,
}

fn default_true() -> bool {
    true
}
fn default_thermal_poll_ms() -> u64 {
    defaults::THERMAL_POLL_INTERVAL_MS
}
fn default_thermal_delta() -> f64 {
    defaults::THERMAL_DELTA_THRESHOLD_C
}
fn default_thermal_min_points() -> usize {
    defaults::THERMAL_MIN_POINTS
}
fn default_thermal_calibration_secs() -> f64 {
    defaults::THERMAL_CALIBRATION_SECS
}
fn default_thermal_refresh_hz() -> f64 {
    defaults::THERMAL_REFRESH_HZ
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_thermal_poll_ms(),
            delta_threshold_c: default_thermal_delta(),
            min_points: default_thermal_min_points(),
            calibration_secs: default_thermal_calibration_secs(),
            refresh_hz: default_thermal_refresh_hz(),
        }
    }
}

impl ThermalConfig {
    pub fn poll_interval(&self) -> Duration {
        millis(self.poll_interval_ms)
    }
    pub fn calibration_window(&self) -> Duration {
        calibration_window(self.calibration_secs)
    }
}

// ============================================================================
// Pyrometer Array
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PyrometerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_pyrometer_poll_ms")]
    pub poll_interval_ms: u64,

    /// Rise over a channel's baseline that votes positive (°C)
    #[serde(default = "default_pyrometer_threshold")]
    pub threshold_c: f64,

    #[serde(default = "default_pyrometer_samples")]
    pub calibration_samples: usize,

    #[serde(default = "default_pyrometer_window")]
    pub calibration_window_secs: f64,

    /// Populated multiplexer channels, starting from channel 0
    #[serde(default = "default_pyrometer_channels")]
    pub channels: usize,
}

fn default_pyrometer_poll_ms() -> u64 {
    defaults::PYROMETER_POLL_INTERVAL_MS
}
fn default_pyrometer_threshold() -> f64 {
    defaults::PYROMETER_THRESHOLD_C
}
fn default_pyrometer_samples() -> usize {
    defaults::PYROMETER_CALIBRATION_SAMPLES
}
fn default_pyrometer_window() -> f64 {
    defaults::PYROMETER_CALIBRATION_WINDOW_SECS
}
fn default_pyrometer_channels() -> usize {
    defaults::MAX_PYROMETER_CHANNELS
}

impl Default for PyrometerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_pyrometer_poll_ms(),
            threshold_c: default_pyrometer_threshold(),
            calibration_samples: default_pyrometer_samples(),
            calibration_window_secs: default_pyrometer_window(),
            channels: default_pyrometer_channels(),
        }
    }
}

impl PyrometerConfig {
    pub fn poll_interval(&self) -> Duration {
        millis(self.poll_interval_ms)
    }
    pub fn calibration_window(&self) -> Duration {
        calibration_window(self.calibration_window_secs)
    }
}

// ============================================================================
// Proximity Switches
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_proximity_poll_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_proximity_pins")]
    pub pins: Vec<u8>,
}

fn default_proximity_poll_ms() -> u64 {
    defaults::PROXIMITY_POLL_INTERVAL_MS
}
fn default_proximity_pins() -> Vec<u8> {
    defaults::PROXIMITY_PINS.to_vec()
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_proximity_poll_ms(),
            pins: default_proximity_pins(),
        }
    }
}

impl ProximityConfig {
    pub fn poll_interval(&self) -> Duration {
        millis(self.poll_interval_ms)
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// Parameters of the simulated carousel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Carousel speed (rev/min)
    #[serde(default = "default_sim_rpm")]
    pub rpm: f64,

    /// Chance that a partition carries metal on a given revolution
    #[serde(default = "default_sim_metal_probability")]
    pub metal_probability: f64,

    /// Seed for the metal placement pattern
    #[serde(default)]
    pub seed: u64,

    /// Pyrometer channels that never answer
    #[serde(default)]
    pub failed_pyrometer_channels: Vec<u8>,
}

fn default_sim_rpm() -> f64 {
    defaults::SIMULATION_RPM
}
fn default_sim_metal_probability() -> f64 {
    defaults::SIMULATION_METAL_PROBABILITY
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rpm: default_sim_rpm(),
            metal_probability: default_sim_metal_probability(),
            seed: 0,
            failed_pyrometer_channels: Vec::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
