//! Analysis Configuration - every pipeline constant as a tunable TOML value
//!
//! Each section implements `Default` with the reference values from
//! [`defaults`](super::defaults), so an empty or missing file reproduces the
//! reference analysis exactly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults::*;
use crate::segmentation::ResamplePeriod;

/// Environment variable pointing at a config file.
pub const CONFIG_ENV_VAR: &str = "GESHA_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "gesha_analysis.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for an analysis run.
///
/// Load with `AnalysisConfig::load()` which searches:
/// 1. `$GESHA_CONFIG` env var
/// 2. `./gesha_analysis.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Time-gap grouping for thermal-loss episodes
    #[serde(default)]
    pub grouping: GroupingConfig,

    /// Temperature-step grouping for heat-session analysis
    #[serde(default)]
    pub continuity: ContinuityConfig,

    /// Grid periods
    #[serde(default)]
    pub resampling: ResamplingConfig,

    /// Heat-session boundary and lag detection
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Per-measurement feature rows and correlation search
    #[serde(default)]
    pub features: FeatureConfig,

    /// Session pruning before training
    #[serde(default)]
    pub filters: SessionFilterConfig,

    /// Trajectory simulation
    #[serde(default)]
    pub prediction: PredictionConfig,

    /// Thermofilter alignment for the extraction-temperature model
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Step-response runs per heat level
    #[serde(default)]
    pub heat_levels: HeatLevelConfig,

    /// Live telemetry client
    #[serde(default)]
    pub live: LiveConfig,
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Consecutive readings further apart than this split groups (ms)
    pub gap_threshold_ms: i64,
    /// Boiler max - min must exceed this (°C)
    pub min_temp_swing_c: f64,
    /// Group span must exceed this when set (ms)
    pub min_duration_ms: Option<i64>,
    /// Drop everything before the later of the boiler/grouphead peaks
    pub crop_to_peak: bool,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            gap_threshold_ms: GROUP_GAP_THRESHOLD_MS,
            min_temp_swing_c: MIN_TEMP_SWING_C,
            min_duration_ms: None,
            crop_to_peak: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuityConfig {
    pub max_boiler_step_c: f64,
    pub min_group_len: usize,
}

impl Default for ContinuityConfig {
    fn default() -> Self {
        Self {
            max_boiler_step_c: MAX_BOILER_STEP_C,
            min_group_len: MIN_CONTINUITY_GROUP_LEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplingConfig {
    /// Forward-fill grid for heat-session analysis
    pub session_period: String,
    /// Fail-fast grid for thermal-loss models
    pub thermal_loss_period: String,
    /// Periods swept by the candidate search
    pub candidate_periods: Vec<String>,
}

impl Default for ResamplingConfig {
    fn default() -> Self {
        Self {
            session_period: SESSION_PERIOD.to_string(),
            thermal_loss_period: THERMAL_LOSS_PERIOD.to_string(),
            candidate_periods: CANDIDATE_PERIODS.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after heat-off that still merges into the same session (ms)
    pub settle_threshold_ms: i64,
    /// Plateau window = factor × session length
    pub plateau_lookahead_factor: usize,
    /// Window of the boiler delta used for lag detection (ms)
    pub delta_window_ms: i64,
    /// Delta above which the boiler is considered rising (°C)
    pub rise_threshold_c: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_threshold_ms: SETTLE_THRESHOLD_MS,
            plateau_lookahead_factor: PLATEAU_LOOKAHEAD_FACTOR,
            delta_window_ms: DELTA_WINDOW_MS,
            rise_threshold_c: RISE_THRESHOLD_C,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub rolling_heat_window_ms: i64,
    pub future_shift_ms: i64,
    pub session_future_shift_ms: i64,
    /// Correlation search: rolling windows tried, (start, end, step) in ms
    pub search_window_range_ms: (i64, i64, i64),
    /// Correlation search: future shifts tried, (start, end, step) in ms
    pub search_shift_range_ms: (i64, i64, i64),
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            rolling_heat_window_ms: ROLLING_HEAT_WINDOW_MS,
            future_shift_ms: FUTURE_SHIFT_MS,
            session_future_shift_ms: SESSION_FUTURE_SHIFT_MS,
            search_window_range_ms: (1_000, 16_000, 500),
            search_shift_range_ms: (18_000, 48_000, 500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionFilterConfig {
    pub min_start_lag_s: Option<f64>,
    pub max_start_lag_s: Option<f64>,
    pub min_stop_lag_s: Option<f64>,
    pub max_stop_lag_s: Option<f64>,
    pub max_temp_initial_c: Option<f64>,
    /// Drop sessions that heated but barely rose from a near-boiling start
    pub drop_saturated: bool,
}

impl Default for SessionFilterConfig {
    fn default() -> Self {
        Self {
            min_start_lag_s: Some(MIN_START_LAG_S),
            max_start_lag_s: Some(MAX_START_LAG_S),
            min_stop_lag_s: Some(MIN_STOP_LAG_S),
            max_stop_lag_s: Some(MAX_STOP_LAG_S),
            max_temp_initial_c: Some(MAX_TEMP_INITIAL_C),
            drop_saturated: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub time_increment_ms: i64,
    pub steps: usize,
    pub initial_boiler_c: f64,
    pub initial_grouphead_c: f64,
    pub holdout_fraction: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            time_increment_ms: PREDICTION_INCREMENT_MS,
            steps: PREDICTION_STEPS,
            initial_boiler_c: PREDICTION_INITIAL_BOILER_C,
            initial_grouphead_c: PREDICTION_INITIAL_GROUPHEAD_C,
            holdout_fraction: HOLDOUT_FRACTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Grid both streams are forward-filled onto before joining
    pub period: String,
    /// Samples dropped from the end of every shot
    pub tail_trim_samples: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            period: EXTRACTION_PERIOD.to_string(),
            tail_trim_samples: EXTRACTION_TAIL_TRIM_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatLevelConfig {
    /// Bucket-median grid
    pub period: String,
    /// Buckets without a new boiler maximum before the climb counts as over
    pub plateau_patience_samples: usize,
}

impl Default for HeatLevelConfig {
    fn default() -> Self {
        Self {
            period: HEAT_LEVEL_PERIOD.to_string(),
            plateau_patience_samples: HEAT_LEVEL_PLATEAU_PATIENCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub history_capacity: usize,
    pub wait_timeout_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            history_capacity: SENSOR_HISTORY_CAPACITY,
            wait_timeout_ms: TEMP_WAIT_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl AnalysisConfig {
    /// Load configuration using the standard search order:
    /// 1. `$GESHA_CONFIG` environment variable
    /// 2. `./gesha_analysis.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded analysis config from {}", CONFIG_ENV_VAR);
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
                    info!("Loaded analysis config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        for w in super::validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        for w in super::validation::plausibility_warnings(&config) {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write the config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Analysis config saved");
        Ok(())
    }

    /// Validate every section, collecting all violations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let g = &self.grouping;
        if g.gap_threshold_ms <= 0 {
            errors.push(format!("grouping.gap_threshold_ms = {} must be > 0", g.gap_threshold_ms));
        }
        Self::check_finite(g.min_temp_swing_c, "grouping.min_temp_swing_c", &mut errors);
        if let Some(d) = g.min_duration_ms {
            if d < 0 {
                errors.push(format!("grouping.min_duration_ms = {d} cannot be negative"));
            }
        }

        let c = &self.continuity;
        if !(c.max_boiler_step_c.is_finite() && c.max_boiler_step_c > 0.0) {
            errors.push(format!(
                "continuity.max_boiler_step_c = {} must be a positive number",
                c.max_boiler_step_c
            ));
        }

        let r = &self.resampling;
        Self::check_period(&r.session_period, "resampling.session_period", &mut errors);
        Self::check_period(&r.thermal_loss_period, "resampling.thermal_loss_period", &mut errors);
        for p in &r.candidate_periods {
            Self::check_period(p, "resampling.candidate_periods", &mut errors);
        }

        let s = &self.sessions;
        if s.settle_threshold_ms < 0 {
            errors.push(format!(
                "sessions.settle_threshold_ms = {} cannot be negative",
                s.settle_threshold_ms
            ));
        }
        if s.plateau_lookahead_factor == 0 {
            errors.push("sessions.plateau_lookahead_factor must be >= 1".to_string());
        }
        if s.delta_window_ms <= 0 {
            errors.push(format!("sessions.delta_window_ms = {} must be > 0", s.delta_window_ms));
        }
        Self::check_finite(s.rise_threshold_c, "sessions.rise_threshold_c", &mut errors);

        let f = &self.features;
        if f.rolling_heat_window_ms <= 0 {
            errors.push("features.rolling_heat_window_ms must be > 0".to_string());
        }
        if f.future_shift_ms <= 0 || f.session_future_shift_ms <= 0 {
            errors.push("features future shifts must be > 0".to_string());
        }
        Self::check_range(f.search_window_range_ms, "features.search_window_range_ms", &mut errors);
        Self::check_range(f.search_shift_range_ms, "features.search_shift_range_ms", &mut errors);

        let fl = &self.filters;
        Self::check_bounds(fl.min_start_lag_s, fl.max_start_lag_s, "filters.start_lag", &mut errors);
        Self::check_bounds(fl.min_stop_lag_s, fl.max_stop_lag_s, "filters.stop_lag", &mut errors);

        let p = &self.prediction;
        if p.time_increment_ms <= 0 {
            errors.push("prediction.time_increment_ms must be > 0".to_string());
        }
        Self::check_finite(p.initial_boiler_c, "prediction.initial_boiler_c", &mut errors);
        Self::check_finite(p.initial_grouphead_c, "prediction.initial_grouphead_c", &mut errors);
        if !(0.0..1.0).contains(&p.holdout_fraction) {
            errors.push(format!(
                "prediction.holdout_fraction = {} must be in [0, 1)",
                p.holdout_fraction
            ));
        }

        Self::check_period(&self.extraction.period, "extraction.period", &mut errors);
        Self::check_period(&self.heat_levels.period, "heat_levels.period", &mut errors);

        if self.live.history_capacity == 0 {
            errors.push("live.history_capacity must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_finite(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() {
            errors.push(format!("{name}: value must be finite (got {value})"));
        }
    }

    fn check_period(period: &str, name: &str, errors: &mut Vec<String>) {
        if let Err(e) = period.parse::<ResamplePeriod>() {
            errors.push(format!("{name}: {e}"));
        }
    }

    fn check_range((start, end, step): (i64, i64, i64), name: &str, errors: &mut Vec<String>) {
        if step <= 0 || start <= 0 || end <= start {
            errors.push(format!(
                "{name}: expected 0 < start < end and step > 0 (got {start}, {end}, {step})"
            ));
        }
    }

    fn check_bounds(min: Option<f64>, max: Option<f64>, name: &str, errors: &mut Vec<String>) {
        if let (Some(lo), Some(hi)) = (min, max) {
            if !lo.is_finite() || !hi.is_finite() {
                errors.push(format!("{name}: bounds must be finite (got {lo}, {hi})"));
            } else if hi < lo {
                errors.push(format!("{name}: max ({hi:.3}) must be >= min ({lo:.3})"));
            }
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}
