//! Raw telemetry types: Measurement, MeasurementSeries, MeasurementGroup, ResampledSeries

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Milliseconds since the Unix epoch, as logged by the controller.
pub type Millis = i64;

// ============================================================================
// Measurement
// ============================================================================

/// A single controller telemetry row.
///
/// Rows are immutable once ingested; every pipeline stage derives new views
/// instead of editing them in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Log time (ms since epoch)
    pub time: Millis,
    /// Boiler temperature (°C)
    pub boiler_temp_c: f64,
    /// Grouphead temperature (°C)
    pub grouphead_temp_c: f64,
    /// Thermofilter temperature (°C), only present during extraction experiments
    #[serde(default)]
    pub thermofilter_temp_c: Option<f64>,
    /// Heater duty cycle in [0, 1]
    pub heat_level: f64,
    /// Controller setpoint (°C)
    #[serde(default)]
    pub target_temp_c: Option<f64>,
    /// Machine power switch state
    #[serde(default)]
    pub power: Option<bool>,
}

impl Measurement {
    /// Build a row with only the mandatory channels populated.
    pub fn new(time: Millis, boiler_temp_c: f64, grouphead_temp_c: f64, heat_level: f64) -> Self {
        Self {
            time,
            boiler_temp_c,
            grouphead_temp_c,
            thermofilter_temp_c: None,
            heat_level,
            target_temp_c: None,
            power: None,
        }
    }

    /// Copy of this row re-stamped at `time`.
    pub fn at(&self, time: Millis) -> Self {
        Self { time, ..*self }
    }
}

// ============================================================================
// MeasurementSeries
// ============================================================================

/// Ordered, de-duplicated ingestion result.
///
/// Rows are keyed by time during construction; a later row with an existing
/// timestamp replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSeries {
    rows: Vec<Measurement>,
}

impl MeasurementSeries {
    /// Build a series from rows in any order.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = Measurement>,
    {
        let keyed: BTreeMap<Millis, Measurement> =
            rows.into_iter().map(|m| (m.time, m)).collect();
        Self {
            rows: keyed.into_values().collect(),
        }
    }

    pub fn rows(&self) -> &[Measurement] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Measurement> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Time span covered (first, last), if any rows exist.
    pub fn time_range(&self) -> Option<(Millis, Millis)> {
        Some((self.rows.first()?.time, self.rows.last()?.time))
    }

    /// Keep only rows logged while the machine was switched on.
    ///
    /// Rows without a power reading are dropped as well.
    pub fn powered_only(self) -> Self {
        Self {
            rows: self
                .rows
                .into_iter()
                .filter(|m| m.power == Some(true))
                .collect(),
        }
    }

    /// Merge another series into this one. Rows from `other` win on
    /// timestamp collisions.
    pub fn merge(self, other: Self) -> Self {
        Self::from_rows(self.rows.into_iter().chain(other.rows))
    }
}

// ============================================================================
// MeasurementGroup
// ============================================================================

/// A contiguous-in-time run of measurements produced by grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementGroup {
    /// Position of the group in the grouping output
    pub id: usize,
    pub rows: Vec<Measurement>,
}

impl MeasurementGroup {
    pub fn new(id: usize, rows: Vec<Measurement>) -> Self {
        Self { id, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Elapsed time between the first and last row (ms).
    pub fn duration_ms(&self) -> Millis {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => 0,
        }
    }

    /// Boiler temperature swing (max - min) across the group.
    pub fn boiler_swing_c(&self) -> f64 {
        let (min, max) = self.rows.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), m| (lo.min(m.boiler_temp_c), hi.max(m.boiler_temp_c)),
        );
        if self.rows.is_empty() {
            0.0
        } else {
            max - min
        }
    }
}

// ============================================================================
// ResampledSeries
// ============================================================================

/// A group snapped onto a fixed-period grid. Row times are grid labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampledSeries {
    pub group_id: usize,
    pub period_ms: Millis,
    pub rows: Vec<Measurement>,
}

impl ResampledSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn heat_levels(&self) -> Vec<f64> {
        self.rows.iter().map(|m| m.heat_level).collect()
    }

    pub fn boiler_temps(&self) -> Vec<f64> {
        self.rows.iter().map(|m| m.boiler_temp_c).collect()
    }

    /// Elapsed seconds between two row indices.
    pub fn seconds_between(&self, from: usize, to: usize) -> f64 {
        (self.rows[to].time - self.rows[from].time) as f64 / 1000.0
    }

    /// Convert a duration into a whole number of grid samples.
    pub fn samples_for(&self, duration_ms: Millis) -> usize {
        if self.period_ms <= 0 {
            return 0;
        }
        usize::try_from(duration_ms / self.period_ms).unwrap_or(0)
    }
}
