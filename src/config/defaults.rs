//! System-wide default constants.
//!
//! Reference values from the boiler cool-down and warm-up investigations. Every constant
//! here backs a field of [`AnalysisConfig`](super::AnalysisConfig) and can be
//! overridden from TOML.

// ============================================================================
// Grouping (thermal-loss variant)
// ============================================================================

/// Readings further apart than this start a new group (ms).
///
/// The controller logs at most ~1 s apart while running.
pub const GROUP_GAP_THRESHOLD_MS: i64 = 10_000;

/// Minimum boiler swing for a cool-down episode (°C).
///
/// Boiler from ~80 °C down to a ~30 °C room.
pub const MIN_TEMP_SWING_C: f64 = 80.0 - 30.0;

/// Minimum group span used by the long-decay variant (ms). 4 hours.
pub const LONG_DECAY_MIN_DURATION_MS: i64 = 4 * 60 * 60 * 1000;

// ============================================================================
// Grouping (predictive variant)
// ============================================================================

/// A boiler step larger than this between consecutive readings marks a
/// discontinuity (°C).
pub const MAX_BOILER_STEP_C: f64 = 2.0;

/// Groups with fewer rows are too short to train on.
pub const MIN_CONTINUITY_GROUP_LEN: usize = 1_000;

// ============================================================================
// Resampling
// ============================================================================

/// Upsampling grid for heat-session analysis.
pub const SESSION_PERIOD: &str = "100ms";

/// Resample period for the thermal-loss models. Best R²/MSE trade-off of the
/// candidate sweep.
pub const THERMAL_LOSS_PERIOD: &str = "5m";

/// Periods swept by `candidates`.
pub const CANDIDATE_PERIODS: [&str; 9] = ["min", "10s", "30s", "1m", "5m", "10m", "20m", "30m", "1h"];

// ============================================================================
// Heat sessions
// ============================================================================

/// Idle time after heat-off that separates two sessions (ms).
///
/// Maximizes the correlation between heat-level sum and temperature rise.
pub const SETTLE_THRESHOLD_MS: i64 = 7_000;

/// Plateau search window as a multiple of the session length.
pub const PLATEAU_LOOKAHEAD_FACTOR: usize = 3;

/// Window for the 1-second boiler delta (ms).
pub const DELTA_WINDOW_MS: i64 = 1_000;

/// 1-second boiler delta that counts as a visible rise (°C).
pub const RISE_THRESHOLD_C: f64 = 0.25;

// ============================================================================
// Feature rows
// ============================================================================

/// Trailing heat-level window for whole-group feature rows (ms).
pub const ROLLING_HEAT_WINDOW_MS: i64 = 26_000;

/// Look-ahead for whole-group future temperature change (ms).
pub const FUTURE_SHIFT_MS: i64 = 216_000;

/// Look-ahead for per-session future temperature change (ms).
pub const SESSION_FUTURE_SHIFT_MS: i64 = 30_000;

// ============================================================================
// Session pruning
// ============================================================================

pub const MIN_START_LAG_S: f64 = 2.0;
pub const MAX_START_LAG_S: f64 = 20.0;
pub const MIN_STOP_LAG_S: f64 = 25.0;
pub const MAX_STOP_LAG_S: f64 = 90.0;

/// Sessions starting above boiling are steam-mode runs.
pub const MAX_TEMP_INITIAL_C: f64 = 100.0;

// ============================================================================
// Prediction
// ============================================================================

/// Step size of the thermal-loss trajectory (ms). 5 minutes.
pub const PREDICTION_INCREMENT_MS: i64 = 5 * 60 * 1000;

/// Number of steps simulated by `thermal-loss`.
pub const PREDICTION_STEPS: usize = 90;

pub const PREDICTION_INITIAL_BOILER_C: f64 = 92.0;
pub const PREDICTION_INITIAL_GROUPHEAD_C: f64 = 75.0;

/// Share of each dataset held out for scoring.
pub const HOLDOUT_FRACTION: f64 = 0.2;

// ============================================================================
// Extraction temperature
// ============================================================================

/// Grid the thermofilter and controller streams are joined on.
pub const EXTRACTION_PERIOD: &str = "100ms";

/// Samples dropped from the end of each shot, where the pump has stopped.
pub const EXTRACTION_TAIL_TRIM_SAMPLES: usize = 10;

// ============================================================================
// Heat-level response
// ============================================================================

pub const HEAT_LEVEL_PERIOD: &str = "1s";

/// Buckets without a new boiler maximum before a run counts as peaked.
pub const HEAT_LEVEL_PLATEAU_PATIENCE: usize = 30;

// ============================================================================
// Live client
// ============================================================================

/// Ring-buffer capacity per sensor. 1 hour at 10 Hz.
pub const SENSOR_HISTORY_CAPACITY: usize = 36_000;

/// Default timeout for temperature waits (ms). 30 minutes.
pub const TEMP_WAIT_TIMEOUT_MS: u64 = 30 * 60 * 1000;
