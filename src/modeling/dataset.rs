//! Regression datasets
//!
//! Builds `(X, y)` matrices from resampled groups. Each group contributes its
//! own one-step transitions; transitions never span two groups.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::ModelError;
use crate::types::{HeatSession, Measurement, MeasurementFeatureRow, ResampledSeries};

/// A measurement channel usable as a feature or target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    BoilerTempC,
    GroupheadTempC,
    HeatLevel,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::BoilerTempC => "boiler_temp_c",
            Column::GroupheadTempC => "grouphead_temp_c",
            Column::HeatLevel => "heat_level",
        }
    }

    pub fn value(&self, m: &Measurement) -> f64 {
        match self {
            Column::BoilerTempC => m.boiler_temp_c,
            Column::GroupheadTempC => m.grouphead_temp_c,
            Column::HeatLevel => m.heat_level,
        }
    }
}

/// What a transition dataset predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// `y[t] = v[t + 1] - v[t]`
    #[default]
    Delta,
    /// `y[t] = v[t + 1]`
    NextState,
}

/// Feature matrix plus single target, ready for fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionDataset {
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub records: Array2<f64>,
    pub targets: Array1<f64>,
}

impl RegressionDataset {
    /// Build from row-major features. Every row must have `feature_names.len()` values.
    pub fn from_rows(
        feature_names: Vec<String>,
        target_name: impl Into<String>,
        rows: Vec<Vec<f64>>,
        targets: Vec<f64>,
    ) -> Result<Self, ModelError> {
        let width = feature_names.len();
        if rows.len() != targets.len() {
            return Err(ModelError::DimensionMismatch {
                expected: rows.len(),
                found: targets.len(),
            });
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(ModelError::DimensionMismatch {
                expected: width,
                found: bad.len(),
            });
        }

        let n = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let records = Array2::from_shape_vec((n, width), flat).map_err(|e| ModelError::Fit(e.to_string()))?;

        Ok(Self {
            feature_names,
            target_name: target_name.into(),
            records,
            targets: Array1::from_vec(targets),
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Chronological split: the last `holdout_fraction` of rows become the test set.
    pub fn split_holdout(&self, holdout_fraction: f64) -> (Self, Self) {
        let n = self.len();
        let test_len = ((n as f64) * holdout_fraction.clamp(0.0, 1.0)).round() as usize;
        let cut = n - test_len.min(n);

        let take = |lo: usize, hi: usize| Self {
            feature_names: self.feature_names.clone(),
            target_name: self.target_name.clone(),
            records: self.records.slice(ndarray::s![lo..hi, ..]).to_owned(),
            targets: self.targets.slice(ndarray::s![lo..hi]).to_owned(),
        };
        (take(0, cut), take(cut, n))
    }
}

/// One-step transition dataset across groups.
///
/// For every group with at least two rows, `X = rows[..n-1]` of the chosen
/// columns and `y` is the next value (or its change) of `y_col`.
pub fn transition_dataset(
    groups: &[ResampledSeries],
    x_cols: &[Column],
    y_col: Column,
    target: Target,
) -> Result<RegressionDataset, ModelError> {
    let mut rows = Vec::new();
    let mut ys = Vec::new();

    for group in groups {
        for pair in group.rows.windows(2) {
            let (now, next) = (&pair[0], &pair[1]);
            rows.push(x_cols.iter().map(|c| c.value(now)).collect());
            ys.push(match target {
                Target::Delta => y_col.value(next) - y_col.value(now),
                Target::NextState => y_col.value(next),
            });
        }
    }

    if rows.is_empty() {
        return Err(ModelError::InsufficientSamples { needed: 1, found: 0 });
    }

    RegressionDataset::from_rows(
        x_cols.iter().map(|c| c.name().to_string()).collect(),
        y_col.name(),
        rows,
        ys,
    )
}

/// Change-per-step dataset, the form the thermal-loss models train on.
pub fn delta_dataset(
    groups: &[ResampledSeries],
    x_cols: &[Column],
    y_col: Column,
) -> Result<RegressionDataset, ModelError> {
    transition_dataset(groups, x_cols, y_col, Target::Delta)
}

/// `[temp_initial, temp_initial_grouphead, temp_diff] -> heat_level_sum`.
pub fn heat_sum_dataset(sessions: &[HeatSession]) -> Result<RegressionDataset, ModelError> {
    if sessions.is_empty() {
        return Err(ModelError::InsufficientSamples { needed: 1, found: 0 });
    }
    RegressionDataset::from_rows(
        vec![
            "temp_initial".to_string(),
            "temp_initial_grouphead".to_string(),
            "temp_diff".to_string(),
        ],
        "heat_level_sum",
        sessions
            .iter()
            .map(|s| vec![s.temp_initial, s.temp_initial_grouphead, s.temp_diff])
            .collect(),
        sessions.iter().map(|s| s.heat_level_sum).collect(),
    )
}

/// `[grouphead, boiler, rolling_heat_level] -> future_temp_diff`.
pub fn feature_row_dataset(rows: &[MeasurementFeatureRow]) -> Result<RegressionDataset, ModelError> {
    if rows.is_empty() {
        return Err(ModelError::InsufficientSamples { needed: 1, found: 0 });
    }
    RegressionDataset::from_rows(
        vec![
            "grouphead_temp_c".to_string(),
            "boiler_temp_c".to_string(),
            "rolling_heat_level".to_string(),
        ],
        "future_temp_diff",
        rows.iter()
            .map(|r| vec![r.grouphead_temp_c, r.boiler_temp_c, r.rolling_heat_level])
            .collect(),
        rows.iter().map(|r| r.future_temp_diff).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Millis;

    fn group(id: usize, temps: &[(f64, f64)]) -> ResampledSeries {
        ResampledSeries {
            group_id: id,
            period_ms: 1_000,
            rows: temps
                .iter()
                .enumerate()
                .map(|(i, &(b, g))| Measurement::new(i as Millis * 1_000, b, g, 0.0))
                .collect(),
        }
    }

    #[test]
    fn test_delta_dataset_never_crosses_groups() {
        let groups = vec![
            group(0, &[(90.0, 80.0), (89.0, 79.5), (88.5, 79.0)]),
            group(1, &[(60.0, 55.0), (59.0, 54.0)]),
        ];
        let ds = delta_dataset(&groups, &[Column::BoilerTempC, Column::GroupheadTempC], Column::BoilerTempC)
            .expect("dataset");

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.n_features(), 2);
        assert_eq!(ds.targets.to_vec(), vec![-1.0, -0.5, -1.0]);
        assert_eq!(ds.records.row(2).to_vec(), vec![60.0, 55.0]);
        assert_eq!(ds.target_name, "boiler_temp_c");
    }

    #[test]
    fn test_next_state_target() {
        let groups = vec![group(0, &[(90.0, 80.0), (89.0, 79.5)])];
        let ds = transition_dataset(&groups, &[Column::BoilerTempC], Column::GroupheadTempC, Target::NextState)
            .expect("dataset");
        assert_eq!(ds.targets.to_vec(), vec![79.5]);
    }

    #[test]
    fn test_single_row_groups_give_no_samples() {
        let groups = vec![group(0, &[(90.0, 80.0)])];
        assert!(matches!(
            delta_dataset(&groups, &[Column::BoilerTempC], Column::BoilerTempC),
            Err(ModelError::InsufficientSamples { .. })
        ));
    }

    #[test]
    fn test_holdout_split_is_chronological() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let ys: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let ds = RegressionDataset::from_rows(vec!["x".into()], "y", rows, ys).expect("dataset");

        let (train, test) = ds.split_holdout(0.2);
        assert_eq!(train.len(), 8);
        assert_eq!(test.targets.to_vec(), vec![8.0, 9.0]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = RegressionDataset::from_rows(
            vec!["a".into(), "b".into()],
            "y",
            vec![vec![1.0, 2.0], vec![3.0]],
            vec![0.0, 1.0],
        );
        assert!(matches!(result, Err(ModelError::DimensionMismatch { expected: 2, found: 1 })));
    }
}
