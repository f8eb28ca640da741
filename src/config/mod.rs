//! Analysis Configuration Module
//!
//! Every grouping, segmentation, feature and prediction constant is loaded
//! from TOML so alternative thresholds can be tried without rebuilding.
//!
//! ## Loading Order
//!
//! 1. `GESHA_CONFIG` environment variable (path to TOML file)
//! 2. `gesha_analysis.toml` in the current working directory
//! 3. Built-in defaults (the reference analysis values)
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(AnalysisConfig::load());
//!
//! // Anywhere in the codebase:
//! let settle = config::get().sessions.settle_threshold_ms;
//! ```
//!
//! Library entry points take the config sections as arguments; the global is
//! only a convenience for binaries.

mod analysis_config;
pub mod defaults;
pub mod validation;

pub use analysis_config::*;

use std::sync::OnceLock;

/// Global analysis configuration, initialized once at startup.
static ANALYSIS_CONFIG: OnceLock<AnalysisConfig> = OnceLock::new();

/// Initialize the global analysis configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: AnalysisConfig) {
    if ANALYSIS_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get the global analysis configuration.
///
/// Falls back to the built-in defaults when `init()` was never called.
pub fn get() -> &'static AnalysisConfig {
    ANALYSIS_CONFIG.get_or_init(AnalysisConfig::default)
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    ANALYSIS_CONFIG.get().is_some()
}
