//! Contiguity Grouping
//!
//! Splits an ordered measurement series into contiguous runs. Two variants:
//!
//! - **Time gaps** (`group_measurements`): a new group starts wherever two
//!   consecutive readings are more than `gap_threshold_ms` apart. Groups are
//!   kept only if the boiler swung far enough (and, optionally, lasted long
//!   enough), then cropped to the cool-down after the later sensor peak.
//! - **Temperature continuity** (`group_by_temperature_continuity`): a boiler
//!   step larger than `max_boiler_step_c` between consecutive readings marks a
//!   logging discontinuity. Short groups are discarded and the rest are
//!   returned longest first.

use tracing::debug;

use crate::config::{ContinuityConfig, GroupingConfig};
use crate::types::{Measurement, MeasurementGroup, MeasurementSeries, Millis};

// ============================================================================
// Gap statistics
// ============================================================================

/// Sampling-interval statistics over a row slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapStats {
    pub largest_ms: Millis,
    pub mean_ms: f64,
    pub smallest_ms: Millis,
}

fn gaps(rows: &[Measurement]) -> impl Iterator<Item = Millis> + '_ {
    rows.windows(2).map(|w| w[1].time - w[0].time)
}

/// Largest interval between consecutive rows. `None` for fewer than two rows.
pub fn largest_gap(rows: &[Measurement]) -> Option<Millis> {
    gaps(rows).max()
}

fn smallest_gap(rows: &[Measurement]) -> Option<Millis> {
    gaps(rows).min()
}

fn mean_gap(rows: &[Measurement]) -> Option<f64> {
    if rows.len() < 2 {
        return None;
    }
    let total: Millis = gaps(rows).sum();
    Some(total as f64 / (rows.len() - 1) as f64)
}

pub fn gap_stats(rows: &[Measurement]) -> Option<GapStats> {
    Some(GapStats {
        largest_ms: largest_gap(rows)?,
        mean_ms: mean_gap(rows)?,
        smallest_ms: smallest_gap(rows)?,
    })
}

// ============================================================================
// Time-gap grouping
// ============================================================================

/// Split rows wherever the time step exceeds `gap_threshold_ms`.
///
/// Every returned run is non-empty; gaps inside a run never exceed the
/// threshold and gaps between runs always do.
pub fn split_on_time_gaps(rows: &[Measurement], gap_threshold_ms: Millis) -> Vec<&[Measurement]> {
    split_where(rows, |prev, next| next.time - prev.time > gap_threshold_ms)
}

/// Group a series into thermal-loss episodes.
pub fn group_measurements(series: &MeasurementSeries, config: &GroupingConfig) -> Vec<MeasurementGroup> {
    let candidates = split_on_time_gaps(series.rows(), config.gap_threshold_ms);
    let candidate_count = candidates.len();

    let groups: Vec<MeasurementGroup> = candidates
        .into_iter()
        .map(|rows| MeasurementGroup::new(0, rows.to_vec()))
        .filter(|group| group.boiler_swing_c() > config.min_temp_swing_c)
        .filter(|group| match config.min_duration_ms {
            Some(min) => group.duration_ms() > min,
            None => true,
        })
        .enumerate()
        .map(|(id, group)| {
            let rows = if config.crop_to_peak {
                crop_to_peak(group.rows)
            } else {
                group.rows
            };
            MeasurementGroup::new(id, rows)
        })
        .collect();

    debug!(
        candidates = candidate_count,
        accepted = groups.len(),
        "Grouped measurements by time gaps"
    );
    groups
}

/// Keep the suffix starting at the later of the boiler and grouphead peaks.
///
/// Ties resolve to the first occurrence of each maximum.
pub fn crop_to_peak(rows: Vec<Measurement>) -> Vec<Measurement> {
    let boiler_peak = first_argmax(rows.iter().map(|m| m.boiler_temp_c));
    let grouphead_peak = first_argmax(rows.iter().map(|m| m.grouphead_temp_c));
    match boiler_peak.max(grouphead_peak) {
        Some(peak) => rows[peak..].to_vec(),
        None => rows,
    }
}

/// Index of the first maximum. NaN values never win.
pub(crate) fn first_argmax<I>(values: I) -> Option<usize>
where
    I: IntoIterator<Item = f64>,
{
    let mut best: Option<(usize, f64)> = None;
    for (idx, value) in values.into_iter().enumerate() {
        match best {
            Some((_, current)) if !(value > current) => {}
            _ if value.is_nan() => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

// ============================================================================
// Temperature-continuity grouping
// ============================================================================

/// Group a series into continuous logging runs for heat-session analysis.
///
/// The first row of the series has no predecessor and is dropped. Runs must
/// be longer than `min_group_len`; each kept run then loses its leading row
/// (the row that jumped) and the result is sorted longest first.
pub fn group_by_temperature_continuity(
    series: &MeasurementSeries,
    config: &ContinuityConfig,
) -> Vec<MeasurementGroup> {
    let rows = series.rows();
    if rows.len() < 2 {
        return Vec::new();
    }

    let runs = split_where(&rows[1..], |prev, next| {
        (next.boiler_temp_c - prev.boiler_temp_c).abs() > config.max_boiler_step_c
    });
    let run_count = runs.len();

    let mut kept: Vec<Vec<Measurement>> = runs
        .into_iter()
        .filter(|run| run.len() > config.min_group_len)
        .map(|run| run[1..].to_vec())
        .collect();

    kept.sort_by(|a, b| b.len().cmp(&a.len()));

    debug!(
        runs = run_count,
        kept = kept.len(),
        "Grouped measurements by boiler continuity"
    );

    kept.into_iter()
        .enumerate()
        .map(|(id, rows)| MeasurementGroup::new(id, rows))
        .collect()
}

fn split_where<F>(rows: &[Measurement], mut is_break: F) -> Vec<&[Measurement]>
where
    F: FnMut(&Measurement, &Measurement) -> bool,
{
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..rows.len() {
        if is_break(&rows[i - 1], &rows[i]) {
            runs.push(&rows[start..i]);
            start = i;
        }
    }
    if start < rows.len() {
        runs.push(&rows[start..]);
    }
    runs
}
