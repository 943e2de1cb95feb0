//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Unknown keys are found by parsing the raw TOML into `toml::Value`,
//! walking the key tree and comparing against the known field names.
//! These are warnings only; serde deserialization runs afterwards as usual.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " — did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `SorterConfig`.
///
/// Maintained by hand to match the structs in `sorter_config.rs`.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [rig]
        "rig",
        "rig.name",
        // [tracker]
        "tracker",
        "tracker.partition_distance_m",
        "tracker.tolerance_m",
        "tracker.sample_interval_ms",
        "tracker.speed_samples",
        "tracker.history_length",
        "tracker.echo_pin",
        "tracker.trigger_pin",
        // [export]
        "export",
        "export.offset",
        "export.tick_interval_ms",
        // [actuator]
        "actuator",
        "actuator.forward_pin",
        "actuator.backward_pin",
        "actuator.open_ms",
        "actuator.hold_ms",
        "actuator.close_ms",
        // [thermal]
        "thermal",
        "thermal.enabled",
        "thermal.poll_interval_ms",
        "thermal.delta_threshold_c",
        "thermal.min_points",
        "thermal.calibration_secs",
        "thermal.refresh_hz",
        // [pyrometer]
        "pyrometer",
        "pyrometer.enabled",
        "pyrometer.poll_interval_ms",
        "pyrometer.threshold_c",
        "pyrometer.calibration_samples",
        "pyrometer.calibration_window_secs",
        "pyrometer.channels",
        // [proximity]
        "proximity",
        "proximity.enabled",
        "proximity.poll_interval_ms",
        "proximity.pins",
        // [simulation]
        "simulation",
        "simulation.rpm",
        "simulation.metal_probability",
        "simulation.seed",
        "simulation.failed_pyrometer_channels",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Typo Suggestions
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let b_len = b_chars.len();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Closest known key within edit distance 3, if any.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist > 3 {
            continue;
        }
        match best {
            Some((best_key, best_dist)) if dist > best_dist || (dist == best_dist && k >= best_key) => {}
            _ => best = Some((k, dist)),
        }
    }
    best.map(|(k, _)| k.to_string())
}

/// Report every key in `raw_toml` that `SorterConfig` does not know about.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    let mut warnings = Vec::new();

    for key in walk_toml_keys(&value, "") {
        if !known.contains(key.as_str()) {
            let suggestion = suggest_correction(&key, &known);
            let message = format!("Unknown config key '{key}'");
            warnings.push(ValidationWarning {
                field: key,
                message,
                suggestion,
            });
        }
    }

    warnings
}

// ============================================================================
// Physical Range Checks
// ============================================================================

/// Flag values that are legal but unlikely to work on a real carousel.
pub fn validate_physical_ranges(config: &super::SorterConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |field: &str, message: String| {
        warnings.push(ValidationWarning {
            field: field.to_string(),
            message,
            suggestion: None,
        });
    };

    // HC-SR04 class sensors are unreliable below ~2 cm
    let t = &config.tracker;
    let band_floor = t.partition_distance_m - t.tolerance_m;
    if band_floor < 0.02 - 1e-9 {
        warn(
            "tracker.tolerance_m",
            format!("tracker band starts at {band_floor:.3} m, below the ultrasonic minimum range of 0.02 m"),
        );
    }

    let cycle_ms = config.actuator.open_ms + config.actuator.hold_ms + config.actuator.close_ms;
    if cycle_ms > 10_000 {
        warn(
            "actuator",
            format!("trapdoor cycle lasts {cycle_ms} ms; partitions may pass the exit uncleared"),
        );
    }

    if config.thermal.delta_threshold_c > 10.0 {
        warn(
            "thermal.delta_threshold_c",
            format!(
                "thermal.delta_threshold_c = {:.1} °C is far above typical object contrast",
                config.thermal.delta_threshold_c
            ),
        );
    }

    if config.thermal.enabled
        && config.thermal.poll_interval_ms < (1_000.0 / config.thermal.refresh_hz) as u64
    {
        warn(
            "thermal.poll_interval_ms",
            "thermal.poll_interval_ms is shorter than one frame at refresh_hz; frames will repeat".to_string(),
        );
    }

    if config.proximity.enabled && config.proximity.pins.is_empty() {
        warn(
            "proximity.pins",
            "proximity switches enabled but no pins configured".to_string(),
        );
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("tolerence_m", "tolerance_m"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [tracker]
            tolerance_m = 0.03
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"tracker".to_string()));
        assert!(keys.contains(&"tracker.tolerance_m".to_string()));
    }

    #[test]
    fn test_known_keys_accept_defaults() {
        let toml_str = crate::config::SorterConfig::default()
            .to_toml()
            .unwrap();
        assert!(validate_unknown_keys(&toml_str).is_empty());
    }

    #[test]
    fn test_default_config_has_no_range_warnings() {
        let warnings = validate_physical_ranges(&crate::config::SorterConfig::default());
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_long_cycle_warns() {
        let mut config = crate::config::SorterConfig::default();
        config.actuator.hold_ms = 20_000;
        let warnings = validate_physical_ranges(&config);
        assert!(warnings.iter().any(|w| w.field == "actuator"));
    }
}
