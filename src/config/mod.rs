//! Sorter Configuration Module
//!
//! Provides rig configuration loaded from TOML files. Every timing, threshold
//! and wiring tunable lives here.
//!
//! ## Loading Order
//!
//! 1. `CAROUSEL_CONFIG` environment variable (path to TOML file)
//! 2. `sorter_config.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(SorterConfig::load());
//!
//! // Anywhere in the codebase:
//! let offset = config::get().export.offset;
//! ```

mod sorter_config;
pub mod defaults;
pub mod validation;

pub use sorter_config::*;

use std::sync::OnceLock;

/// Global sorter configuration, initialized once at startup.
static SORTER_CONFIG: OnceLock<SorterConfig> = OnceLock::new();

/// Initialize the global sorter configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: SorterConfig) {
    if SORTER_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global sorter configuration.
///
/// Falls back to built-in defaults if `init()` was never called.
pub fn get() -> &'static SorterConfig {
    SORTER_CONFIG.get_or_init(|| {
        tracing::warn!("config::get() called before config::init() — using defaults");
        SorterConfig::default()
    })
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    SORTER_CONFIG.get().is_some()
}
