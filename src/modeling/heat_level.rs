//! Heater response
//!
//! - `preheat_level`: duty cycle that holds a setpoint while the grouphead
//!   is still warming up.
//! - `heat_level_response`: step-response runs recorded at different duty
//!   cycles, bucket-median resampled onto a shared grid so the boiler curves
//!   line up by elapsed time.

use std::collections::BTreeMap;

use serde::Serialize;
use statrs::statistics::{Data, Median};
use tracing::{debug, info};

use super::ModelError;
use crate::config::HeatLevelConfig;
use crate::segmentation::{max_temp_index, ResamplePeriod};
use crate::types::{Measurement, MeasurementSeries, Millis};

// ============================================================================
// Preheat level
// ============================================================================

/// `(highest setpoint in band, grouphead divisor)`, ascending.
const PREHEAT_BANDS: [(f64, f64); 8] = [
    (90.0, 74.0),
    (93.0, 76.0),
    (95.0, 78.0),
    (99.0, 80.0),
    (101.0, 82.0),
    (103.0, 84.0),
    (107.0, 86.0),
    (109.0, 88.0),
];

const PREHEAT_TOP_DIVISOR: f64 = 90.0;

/// Heat level to apply during preheat for a setpoint and grouphead reading.
///
/// The grouphead temperature is scaled by a per-band divisor and capped at
/// full power.
pub fn preheat_level(target_temp_c: f64, grouphead_temp_c: f64) -> f64 {
    let divisor = PREHEAT_BANDS
        .iter()
        .find(|(upper, _)| target_temp_c <= *upper)
        .map_or(PREHEAT_TOP_DIVISOR, |&(_, divisor)| divisor);
    (grouphead_temp_c / divisor).clamp(0.0, 1.0)
}

// ============================================================================
// Per-heat-level response
// ============================================================================

/// One step-response run recorded at a fixed duty cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatLevelRun {
    pub heat_level: f64,
    pub rows: Vec<Measurement>,
}

impl HeatLevelRun {
    /// The run's level is the highest duty cycle it logged.
    pub fn from_series(series: MeasurementSeries) -> Self {
        let rows = series.into_rows();
        let heat_level = rows.iter().map(|m| m.heat_level).fold(0.0, f64::max);
        Self { heat_level, rows }
    }
}

/// Bucket median of one run, in long format for charting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatLevelPoint {
    pub heat_level: f64,
    /// Seconds since the run's first bucket
    pub offset_s: f64,
    pub boiler_temp_c: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatLevelSummary {
    pub heat_level: f64,
    pub samples: usize,
    pub initial_boiler_temp_c: f64,
    /// Boiler maximum once it stops climbing
    pub peak_boiler_temp_c: f64,
    pub rise_c: f64,
    pub peak_offset_s: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeatLevelResponse {
    pub points: Vec<HeatLevelPoint>,
    /// One row per run, ascending heat level
    pub summaries: Vec<HeatLevelSummary>,
    /// Mean grouphead bucket median across every run
    pub grouphead_mean_c: Option<f64>,
}

struct MedianBucket {
    label: Millis,
    boiler_temp_c: f64,
    grouphead_temp_c: Option<f64>,
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        None
    } else {
        Some(Data::new(values).median())
    }
}

/// Median of every non-empty bucket. Buckets without a finite boiler reading
/// are left out.
fn median_buckets(rows: &[Measurement], period_ms: Millis) -> Vec<MedianBucket> {
    let mut buckets: BTreeMap<Millis, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for m in rows {
        let (boiler, grouphead) = buckets.entry(m.time.div_euclid(period_ms) * period_ms).or_default();
        boiler.push(m.boiler_temp_c);
        grouphead.push(m.grouphead_temp_c);
    }

    buckets
        .into_iter()
        .filter_map(|(label, (boiler, grouphead))| {
            Some(MedianBucket {
                label,
                boiler_temp_c: median(boiler)?,
                grouphead_temp_c: median(grouphead),
            })
        })
        .collect()
}

/// Resample every run and line the boiler curves up by elapsed time.
///
/// `plateau_patience_samples` buckets without a new boiler maximum end the
/// climb used for each run's peak.
pub fn heat_level_response(runs: &[HeatLevelRun], cfg: &HeatLevelConfig) -> Result<HeatLevelResponse, ModelError> {
    let period: ResamplePeriod = cfg.period.parse()?;

    let mut ordered: Vec<&HeatLevelRun> = runs.iter().collect();
    ordered.sort_by(|a, b| a.heat_level.total_cmp(&b.heat_level));

    let mut points = Vec::new();
    let mut summaries = Vec::new();
    let mut grouphead = Vec::new();

    for (idx, run) in ordered.into_iter().enumerate() {
        if run.rows.is_empty() {
            debug!(heat_level = run.heat_level, "Empty run, skipping");
            continue;
        }
        let period_ms = period.resolve(idx, &run.rows)?;
        let buckets = median_buckets(&run.rows, period_ms);
        let Some(first) = buckets.first() else {
            debug!(heat_level = run.heat_level, "No finite boiler readings, skipping");
            continue;
        };
        let origin = first.label;
        let offset_s = |label: Millis| (label - origin) as f64 / 1000.0;

        let boilers: Vec<f64> = buckets.iter().map(|b| b.boiler_temp_c).collect();
        let peak = max_temp_index(&boilers, 0, cfg.plateau_patience_samples).unwrap_or(0);
        summaries.push(HeatLevelSummary {
            heat_level: run.heat_level,
            samples: buckets.len(),
            initial_boiler_temp_c: boilers[0],
            peak_boiler_temp_c: boilers[peak],
            rise_c: boilers[peak] - boilers[0],
            peak_offset_s: offset_s(buckets[peak].label),
        });

        points.extend(buckets.iter().map(|b| HeatLevelPoint {
            heat_level: run.heat_level,
            offset_s: offset_s(b.label),
            boiler_temp_c: b.boiler_temp_c,
        }));
        grouphead.extend(buckets.iter().filter_map(|b| b.grouphead_temp_c));
    }

    if summaries.is_empty() {
        return Err(ModelError::InsufficientSamples {
            needed: 1,
            found: 0,
        });
    }

    let grouphead_mean_c = (!grouphead.is_empty()).then(|| grouphead.iter().sum::<f64>() / grouphead.len() as f64);
    info!(
        runs = summaries.len(),
        points = points.len(),
        grouphead_mean_c = grouphead_mean_c.unwrap_or(f64::NAN),
        "Heat-level response"
    );

    Ok(HeatLevelResponse {
        points,
        summaries,
        grouphead_mean_c,
    })
}
