//! Session Feature Extraction
//!
//! Turns heat-session bounds on a resampled group into summary rows
//! (`HeatSession`) and per-measurement training rows
//! (`MeasurementFeatureRow`).
//!
//! ## Lag model
//!
//! - **start lag**: heat-on until the 1-second boiler delta first exceeds the
//!   rise threshold. Sessions that never show a rise are dropped.
//! - **stop lag**: heat-off until the plateau.

use std::ops::Range;

use tracing::debug;

use super::heat_sessions::{heat_session_bounds, threshold_samples};
use super::plateau::plateau_index;
use crate::config::SessionConfig;
use crate::types::{HeatSession, HeatSessionBounds, MeasurementFeatureRow, Millis, ResampledSeries};

// ============================================================================
// Delta series
// ============================================================================

/// Boiler change over `window` samples: `T[i] - T[i - window]`.
///
/// The first `window` samples compare against `T[0]`.
pub fn delta_series(temps: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let Some(&first) = temps.first() else {
        return Vec::new();
    };
    temps
        .iter()
        .enumerate()
        .map(|(i, &t)| if i >= window { t - temps[i - window] } else { t - first })
        .collect()
}

/// First index at or after `start` where the delta exceeds `threshold`.
pub fn start_lag_index(delta: &[f64], start: usize, threshold: f64) -> Option<usize> {
    delta
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, &d)| d > threshold)
        .map(|(i, _)| i)
}

// ============================================================================
// Session summaries
// ============================================================================

/// Summarize one session. Returns `None` for degenerate sessions.
///
/// `delta` must be the delta series of the same group's boiler temperatures.
pub fn summarize_session(
    series: &ResampledSeries,
    delta: &[f64],
    bounds: HeatSessionBounds,
    config: &SessionConfig,
) -> Option<HeatSession> {
    let rows = &series.rows;
    let (s, e) = (bounds.start, bounds.end);
    if rows.is_empty() || e >= rows.len() || s > e || delta.len() != rows.len() {
        debug!(group = series.group_id, start = s, end = e, "Session bounds outside series");
        return None;
    }

    let temps = series.boiler_temps();
    let plateau = plateau_index(&temps, bounds, config.plateau_lookahead_factor);

    let Some(rise) = start_lag_index(delta, s, config.rise_threshold_c) else {
        debug!(group = series.group_id, start = s, "No visible rise, dropping session");
        return None;
    };
    let start_lag = series.seconds_between(s, rise);
    if start_lag <= 0.0 {
        debug!(group = series.group_id, start = s, "Rise at heat-on, dropping session");
        return None;
    }

    let heat_level_sum: f64 = rows[s..e].iter().map(|m| m.heat_level).sum();
    let heat_level_avg = if e > s {
        heat_level_sum / (e - s) as f64
    } else {
        0.0
    };

    let max_1s_temp_diff = delta[s..plateau.max(s + 1)]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);

    let temp_initial = rows[s].boiler_temp_c;
    let temp_heatoff = rows[e].boiler_temp_c;
    let temp_plateau = rows[plateau].boiler_temp_c;

    Some(HeatSession {
        session_duration: series.seconds_between(s, plateau),
        heat_level_sum,
        heat_level_avg,
        temp_initial,
        temp_initial_grouphead: rows[s].grouphead_temp_c,
        temp_heatoff,
        temp_diff_heatoff: temp_heatoff - temp_initial,
        temp_diff: temp_plateau - temp_initial,
        temp_plateau,
        start_idx: s,
        end_idx: e,
        plateau_idx: plateau,
        group_id: series.group_id,
        start_lag,
        stop_lag: series.seconds_between(e, plateau),
        max_1s_temp_diff,
    })
}

/// Detect and summarize every heat session in a resampled group.
pub fn extract_heat_sessions(series: &ResampledSeries, config: &SessionConfig) -> Vec<HeatSession> {
    let threshold = threshold_samples(config.settle_threshold_ms, series.period_ms);
    let bounds = heat_session_bounds(&series.heat_levels(), threshold);
    let delta = delta_series(&series.boiler_temps(), series.samples_for(config.delta_window_ms));

    let sessions: Vec<HeatSession> = bounds
        .iter()
        .filter_map(|b| summarize_session(series, &delta, *b, config))
        .collect();

    debug!(
        group = series.group_id,
        bounds = bounds.len(),
        sessions = sessions.len(),
        "Extracted heat sessions"
    );
    sessions
}

// ============================================================================
// Per-measurement rows
// ============================================================================

fn feature_rows(
    series: &ResampledSeries,
    range: Range<usize>,
    window: usize,
    shift: usize,
) -> Vec<MeasurementFeatureRow> {
    let rows = &series.rows;
    let window = window.max(1);
    let end = range.end.min(rows.len());

    let mut prefix = Vec::with_capacity(rows.len() + 1);
    prefix.push(0.0);
    for m in rows {
        let last = prefix.last().copied().unwrap_or(0.0);
        prefix.push(last + m.heat_level);
    }

    (range.start..end)
        .filter_map(|i| {
            let future = rows.get(i + shift)?;
            let m = &rows[i];
            let lo = (i + 1).saturating_sub(window);
            Some(MeasurementFeatureRow {
                time: m.time,
                boiler_temp_c: m.boiler_temp_c,
                grouphead_temp_c: m.grouphead_temp_c,
                heat_level: m.heat_level,
                rolling_heat_level: prefix[i + 1] - prefix[lo],
                future_temp_diff: future.boiler_temp_c - m.boiler_temp_c,
            })
        })
        .collect()
}

/// Training rows around one session.
///
/// Covers `[start - lag_window, plateau)` where `lag_window` is the start lag
/// in samples. The rolling heat sum uses the same window; rows without a
/// value `future_shift_ms` ahead are dropped.
pub fn session_feature_rows(
    series: &ResampledSeries,
    session: &HeatSession,
    future_shift_ms: Millis,
) -> Vec<MeasurementFeatureRow> {
    let lag_window = series
        .samples_for((session.start_lag * 1000.0).round() as Millis)
        .max(1);
    let shift = series.samples_for(future_shift_ms);
    let start = session.start_idx.saturating_sub(lag_window);
    feature_rows(series, start..session.plateau_idx, lag_window, shift)
}

/// Training rows over a whole group.
pub fn measurement_feature_rows(
    series: &ResampledSeries,
    rolling_window_ms: Millis,
    future_shift_ms: Millis,
) -> Vec<MeasurementFeatureRow> {
    feature_rows(
        series,
        0..series.len(),
        series.samples_for(rolling_window_ms),
        series.samples_for(future_shift_ms),
    )
}
