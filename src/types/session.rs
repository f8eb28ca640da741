//! Heat session types: HeatSessionBounds, HeatSession, MeasurementFeatureRow

use serde::{Deserialize, Serialize};

use super::Millis;

/// Index bounds of one heat session within a resampled group.
///
/// `start` is the first heating sample. `end` is the heat-off sample (the
/// first idle sample after the last heating run), or the last index when
/// heating was still on at the end of the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatSessionBounds {
    pub start: usize,
    pub end: usize,
}

impl HeatSessionBounds {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of samples between start and end. Zero when `end` precedes `start`.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl From<(usize, usize)> for HeatSessionBounds {
    fn from((start, end): (usize, usize)) -> Self {
        Self { start, end }
    }
}

/// Summary features of one heat session.
///
/// Column names match the feature table handed to the regression step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatSession {
    /// Seconds from heat-on to the plateau
    pub session_duration: f64,
    pub heat_level_sum: f64,
    pub heat_level_avg: f64,
    /// Boiler temperature at heat-on (°C)
    pub temp_initial: f64,
    /// Grouphead temperature at heat-on (°C)
    pub temp_initial_grouphead: f64,
    /// Boiler temperature at heat-off (°C)
    pub temp_heatoff: f64,
    /// temp_heatoff - temp_initial
    pub temp_diff_heatoff: f64,
    /// temp_plateau - temp_initial
    pub temp_diff: f64,
    /// Maximum boiler temperature after heat-off (°C)
    pub temp_plateau: f64,
    pub start_idx: usize,
    pub end_idx: usize,
    pub plateau_idx: usize,
    /// Group the session was extracted from
    pub group_id: usize,
    /// Seconds between heat-on and the visible temperature rise
    pub start_lag: f64,
    /// Seconds between heat-off and the plateau
    pub stop_lag: f64,
    /// Largest 1-second boiler delta between heat-on and the plateau (°C)
    pub max_1s_temp_diff: f64,
}

/// Per-measurement training row for the step regression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementFeatureRow {
    pub time: Millis,
    pub boiler_temp_c: f64,
    pub grouphead_temp_c: f64,
    pub heat_level: f64,
    /// Heat level summed over the trailing lag window
    pub rolling_heat_level: f64,
    /// Boiler temperature change over the look-ahead shift (°C)
    pub future_temp_diff: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_len() {
        assert_eq!(HeatSessionBounds::new(2, 5).len(), 3);
        assert!(HeatSessionBounds::new(4, 4).is_empty());
    }

    #[test]
    fn test_reversed_bounds_are_empty() {
        let reversed = HeatSessionBounds::from((5, 2));
        assert_eq!(reversed.len(), 0);
        assert!(reversed.is_empty());
    }
}
