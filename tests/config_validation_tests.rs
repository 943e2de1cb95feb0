//! Config Validation Tests
//!
//! Exercise typo detection, range warnings, consistency checks and file
//! loading independently from the rest of the controller.

use std::io::Write;

use carousel_sorter::config::validation::{
    known_config_keys, suggest_correction, validate_physical_ranges, validate_unknown_keys,
};
use carousel_sorter::config::{ConfigError, SorterConfig};

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_tracker_key_warns_with_suggestion() {
    let toml_str = r#"
[tracker]
tolerence_m = 0.03
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("tolerence_m"));
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("tracker.tolerance_m"),
        "Should suggest the correct spelling"
    );
}

#[test]
fn typo_in_section_name_warns() {
    let toml_str = r#"
[actuater]
open_ms = 400
"#;
    let warnings = validate_unknown_keys(toml_str);
    // both the table and its child are unknown
    assert!(warnings.iter().any(|w| w.field == "actuater"));
    let section = warnings.iter().find(|w| w.field == "actuater").unwrap();
    assert_eq!(section.suggestion.as_deref(), Some("actuator"));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[rig]
name = "Line-2"

[tracker]
partition_distance_m = 0.07
tolerance_m = 0.03
sample_interval_ms = 5
speed_samples = 4
history_length = 10

[export]
offset = 2

[actuator]
open_ms = 400
hold_ms = 1000
close_ms = 900

[thermal]
enabled = true
min_points = 10

[pyrometer]
channels = 4
threshold_c = 1.0

[proximity]
pins = [14, 15]

[simulation]
rpm = 3.0
seed = 7
failed_pyrometer_channels = [1]
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
}

#[test]
fn far_off_key_has_no_suggestion() {
    let warnings = validate_unknown_keys("completely_unrelated_setting = 1\n");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].suggestion.is_none());
}

#[test]
fn malformed_toml_is_left_to_serde() {
    assert!(validate_unknown_keys("[tracker\nfoo = ").is_empty());
}

#[test]
fn suggestion_picks_closest_key() {
    let known = known_config_keys();
    assert_eq!(
        suggest_correction("export.ofset", &known).as_deref(),
        Some("export.offset")
    );
}

// ============================================================================
// Range Warnings
// ============================================================================

#[test]
fn band_below_sensor_minimum_warns() {
    let mut config = SorterConfig::default();
    config.tracker.tolerance_m = 0.055;
    let warnings = validate_physical_ranges(&config);
    assert!(warnings.iter().any(|w| w.field == "tracker.tolerance_m"));
}

#[test]
fn thermal_poll_faster_than_refresh_warns() {
    let mut config = SorterConfig::default();
    config.thermal.poll_interval_ms = 100;
    let warnings = validate_physical_ranges(&config);
    assert!(warnings.iter().any(|w| w.field == "thermal.poll_interval_ms"));
}

#[test]
fn empty_proximity_pin_list_warns() {
    let mut config = SorterConfig::default();
    config.proximity.pins.clear();
    let warnings = validate_physical_ranges(&config);
    assert!(warnings.iter().any(|w| w.field == "proximity.pins"));
}

// ============================================================================
// Consistency Checks
// ============================================================================

#[test]
fn too_many_pyrometer_channels_rejected() {
    let mut config = SorterConfig::default();
    config.pyrometer.channels = 9;
    let Err(ConfigError::Validation(errors)) = config.validate() else {
        panic!("nine channels should fail validation");
    };
    assert!(errors.iter().any(|e| e.contains("pyrometer.channels")));
}

#[test]
fn zero_open_time_rejected() {
    let mut config = SorterConfig::default();
    config.actuator.open_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn metal_probability_out_of_range_rejected() {
    let mut config = SorterConfig::default();
    config.simulation.metal_probability = 1.5;
    assert!(config.validate().is_err());
}

#[test]
fn oversized_calibration_windows_rejected() {
    let mut config = SorterConfig::default();
    config.thermal.calibration_secs = 1e20;
    config.pyrometer.calibration_window_secs = 3_600.5;
    let Err(ConfigError::Validation(errors)) = config.validate() else {
        panic!("calibration windows beyond an hour should fail validation");
    };
    assert!(errors.iter().any(|e| e.contains("thermal.calibration_secs")));
    assert!(errors.iter().any(|e| e.contains("pyrometer.calibration_window_secs")));
}

#[test]
fn load_from_file_rejects_huge_calibration_window() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[thermal]\ncalibration_secs = 1e20").unwrap();
    let err = SorterConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn every_error_is_reported_at_once() {
    let mut config = SorterConfig::default();
    config.tracker.speed_samples = 0;
    config.export.offset = 9;
    let Err(ConfigError::Validation(errors)) = config.validate() else {
        panic!("expected validation failure");
    };
    assert_eq!(errors.len(), 2);
    let rendered = ConfigError::Validation(errors).to_string();
    assert!(rendered.contains("speed_samples"));
    assert!(rendered.contains("export.offset"));
}

// ============================================================================
// File Loading
// ============================================================================

#[test]
fn load_from_file_applies_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[export]\noffset = 3\n\n[actuator]\nhold_ms = 900").unwrap();
    let config = SorterConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.export.offset, 3);
    assert_eq!(config.actuator.hold_ms, 900);
    assert_eq!(config.actuator.open_ms, 500);
}

#[test]
fn load_from_file_tolerates_unknown_keys() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[tracker]\ntolerence_m = 0.01").unwrap();
    let config = SorterConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.tracker.tolerance_m, 0.04);
}

#[test]
fn load_from_file_rejects_invalid_values() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[export]\noffset = 6").unwrap();
    let err = SorterConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn load_from_file_reports_parse_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[tracker]\ntolerance_m = \"wide\"").unwrap();
    let err = SorterConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SorterConfig::load_from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}
