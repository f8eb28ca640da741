//! Config validation: unknown-key detection with Levenshtein suggestions
//! and plausibility checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

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
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for AnalysisConfig.
///
/// Kept in step with the section structs in analysis_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [grouping]
        "grouping",
        "grouping.gap_threshold_ms",
        "grouping.min_temp_swing_c",
        "grouping.min_duration_ms",
        "grouping.crop_to_peak",
        // [continuity]
        "continuity",
        "continuity.max_boiler_step_c",
        "continuity.min_group_len",
        // [resampling]
        "resampling",
        "resampling.session_period",
        "resampling.thermal_loss_period",
        "resampling.candidate_periods",
        // [sessions]
        "sessions",
        "sessions.settle_threshold_ms",
        "sessions.plateau_lookahead_factor",
        "sessions.delta_window_ms",
        "sessions.rise_threshold_c",
        // [features]
        "features",
        "features.rolling_heat_window_ms",
        "features.future_shift_ms",
        "features.session_future_shift_ms",
        "features.search_window_range_ms",
        "features.search_shift_range_ms",
        // [filters]
        "filters",
        "filters.min_start_lag_s",
        "filters.max_start_lag_s",
        "filters.min_stop_lag_s",
        "filters.max_stop_lag_s",
        "filters.max_temp_initial_c",
        "filters.drop_saturated",
        // [prediction]
        "prediction",
        "prediction.time_increment_ms",
        "prediction.steps",
        "prediction.initial_boiler_c",
        "prediction.initial_grouphead_c",
        "prediction.holdout_fraction",
        // [extraction]
        "extraction",
        "extraction.period",
        "extraction.tail_trim_samples",
        // [heat_levels]
        "heat_levels",
        "heat_levels.period",
        "heat_levels.plateau_patience_samples",
        // [live]
        "live",
        "live.history_capacity",
        "live.wait_timeout_ms",
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
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Never fails; parse errors surface later from serde.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Plausibility Checks
// ============================================================================

/// Flag values that parse and validate but are unlikely for a home espresso
/// machine logging at ~1 Hz.
pub fn plausibility_warnings(config: &super::AnalysisConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let settle = config.sessions.settle_threshold_ms;
    if settle > 60_000 {
        warnings.push(ValidationWarning {
            field: "sessions.settle_threshold_ms".to_string(),
            message: format!(
                "settle_threshold_ms = {settle} merges heat runs more than a minute apart"
            ),
            suggestion: None,
        });
    }

    let rise = config.sessions.rise_threshold_c;
    if !(0.0..=5.0).contains(&rise) {
        warnings.push(ValidationWarning {
            field: "sessions.rise_threshold_c".to_string(),
            message: format!("rise_threshold_c = {rise:.2} is outside typical range (0-5 °C)"),
            suggestion: None,
        });
    }

    let boiler = config.prediction.initial_boiler_c;
    if !(0.0..=160.0).contains(&boiler) {
        warnings.push(ValidationWarning {
            field: "prediction.initial_boiler_c".to_string(),
            message: format!("initial_boiler_c = {boiler:.1} is outside boiler range (0-160 °C)"),
            suggestion: None,
        });
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================
