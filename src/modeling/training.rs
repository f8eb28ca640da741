//! Model training drivers
//!
//! - Thermal loss: resample cool-down groups, fit per-sensor delta models,
//!   score on a chronological hold-out.
//! - Candidate sweep: repeat thermal-loss training across resample periods.
//! - Heat sum: how much heater-on time a target temperature rise needs.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::dataset::{heat_sum_dataset, Target};
use super::predictor::{JointDeltaModel, PerSensorModel};
use super::regression::{fit_and_evaluate, LinearModel};
use super::ModelError;
use crate::segmentation::{resample, ResamplePeriod};
use crate::types::{CandidateReport, FitScore, HeatSession, MeasurementGroup, Millis, ResampledSeries};

/// Resample every group, skipping (and logging) those with gaps.
///
/// Returns the resampled groups and the number skipped.
pub fn resample_groups(groups: &[MeasurementGroup], period: &ResamplePeriod) -> (Vec<ResampledSeries>, usize) {
    let mut resampled = Vec::with_capacity(groups.len());
    let mut skipped = 0;
    for group in groups {
        match resample(group, period) {
            Ok(series) => resampled.push(series),
            Err(e) => {
                warn!(group = group.id, period = %period, error = %e, "Skipping group");
                skipped += 1;
            }
        }
    }
    (resampled, skipped)
}

/// Trained thermal-loss models for one resample period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermalLossModel {
    pub period: String,
    pub period_ms: Millis,
    pub per_sensor: PerSensorModel,
    pub joint: JointDeltaModel,
    pub boiler_score: FitScore,
    pub grouphead_score: FitScore,
    pub groups_used: usize,
    pub skipped_groups: usize,
}

impl ThermalLossModel {
    pub fn report(&self) -> CandidateReport {
        CandidateReport {
            period: self.period.clone(),
            period_ms: self.period_ms,
            boiler: self.boiler_score,
            grouphead: self.grouphead_score,
            skipped_groups: self.skipped_groups,
        }
    }
}

/// Fit boiler and grouphead delta models on groups resampled at `period`.
///
/// With [`ResamplePeriod::LargestGap`] each group resolves its own period; the
/// reported `period_ms` is the largest of them.
pub fn train_thermal_loss(
    groups: &[MeasurementGroup],
    period: &ResamplePeriod,
    holdout_fraction: f64,
) -> Result<ThermalLossModel, ModelError> {
    let (resampled, skipped_groups) = resample_groups(groups, period);
    if resampled.is_empty() {
        return Err(ModelError::InsufficientSamples {
            needed: 1,
            found: 0,
        });
    }

    let trained = PerSensorModel::train(&resampled, Target::Delta, holdout_fraction)?;
    let joint = JointDeltaModel::from_outputs(&trained.model.boiler, &trained.model.grouphead)?;
    let period_ms = resampled.iter().map(|s| s.period_ms).max().unwrap_or_default();

    info!(
        period = %period,
        groups = resampled.len(),
        skipped = skipped_groups,
        boiler_r2 = trained.boiler_score.r2,
        grouphead_r2 = trained.grouphead_score.r2,
        "Trained thermal-loss models"
    );

    Ok(ThermalLossModel {
        period: period.to_string(),
        period_ms,
        per_sensor: trained.model,
        joint,
        boiler_score: trained.boiler_score,
        grouphead_score: trained.grouphead_score,
        groups_used: resampled.len(),
        skipped_groups,
    })
}

/// Train at every candidate period. Periods that fail to parse or train are
/// logged and left out of the result.
pub fn train_candidates(groups: &[MeasurementGroup], periods: &[String], holdout_fraction: f64) -> Vec<CandidateReport> {
    periods
        .iter()
        .filter_map(|label| {
            let period: ResamplePeriod = match label.parse() {
                Ok(p) => p,
                Err(e) => {
                    warn!(period = %label, error = %e, "Skipping candidate period");
                    return None;
                }
            };
            match train_thermal_loss(groups, &period, holdout_fraction) {
                Ok(model) => {
                    let mut report = model.report();
                    report.period = label.clone();
                    Some(report)
                }
                Err(e) => {
                    warn!(period = %label, error = %e, "Candidate period failed to train");
                    None
                }
            }
        })
        .collect()
}

/// `[temp_initial, temp_initial_grouphead, temp_diff] -> heat_level_sum`.
pub fn fit_heat_sum_model(sessions: &[HeatSession], holdout_fraction: f64) -> Result<(LinearModel, FitScore), ModelError> {
    let dataset = heat_sum_dataset(sessions)?;
    let (model, score) = fit_and_evaluate(&dataset, holdout_fraction)?;
    info!(
        sessions = sessions.len(),
        r2 = score.r2,
        mse = score.mse,
        "Fitted heat-sum model"
    );
    Ok((model, score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Measurement;

    /// Newtonian cooling sampled every second, with a 40 s dropout in the
    /// middle of the second group.
    fn cooling_groups() -> Vec<MeasurementGroup> {
        let curve = |id: usize, start: f64, gap: bool| {
            let rows = (0..600)
                .filter(|i| !(gap && (300..340).contains(i)))
                .map(|i| {
                    let t = i as f64;
                    Measurement::new(
                        i * 1_000,
                        20.0 + (start - 20.0) * (-t / 900.0).exp(),
                        20.0 + (start - 35.0) * (-t / 1_400.0).exp(),
                        0.0,
                    )
                })
                .collect();
            MeasurementGroup::new(id, rows)
        };
        vec![curve(0, 95.0, false), curve(1, 90.0, true), curve(2, 85.0, false)]
    }

    #[test]
    fn test_thermal_loss_skips_groups_with_gaps() {
        let model = train_thermal_loss(&cooling_groups(), &ResamplePeriod::Fixed(10_000), 0.2).expect("train");
        assert_eq!(model.groups_used, 2);
        assert_eq!(model.skipped_groups, 1);
        assert_eq!(model.period, "10s");
        assert!(model.boiler_score.r2 > 0.9, "boiler r2 {}", model.boiler_score.r2);
        // Cooling: a hotter boiler loses heat faster
        assert!(model.per_sensor.boiler.coefficients[0] < 0.0);
    }

    #[test]
    fn test_thermal_loss_with_no_usable_groups_fails() {
        let groups = vec![cooling_groups().remove(1)];
        assert!(train_thermal_loss(&groups, &ResamplePeriod::Fixed(10_000), 0.2).is_err());
    }

    #[test]
    fn test_candidates_keep_requested_labels() {
        let periods = vec!["min".to_string(), "30s".to_string(), "bogus".to_string()];
        let reports = train_candidates(&cooling_groups(), &periods, 0.2);
        assert_eq!(
            reports.iter().map(|r| r.period.as_str()).collect::<Vec<_>>(),
            vec!["min", "30s"]
        );
        // min resolves to the 41 s dropout for the gapped group
        assert_eq!(reports[0].period_ms, 41_000);
        assert_eq!(reports[0].skipped_groups, 0);
    }

    #[test]
    fn test_heat_sum_model_learns_linear_relation() {
        let sessions: Vec<HeatSession> = (0..40)
            .map(|i| {
                let temp_initial = 85.0 + (i % 7) as f64;
                let temp_diff = 1.0 + (i % 5) as f64;
                HeatSession {
                    session_duration: 30.0,
                    heat_level_sum: 40.0 * temp_diff - 2.0 * (temp_initial - 85.0) + 10.0,
                    heat_level_avg: 0.5,
                    temp_initial,
                    temp_initial_grouphead: 70.0 + (i % 3) as f64,
                    temp_heatoff: temp_initial,
                    temp_diff_heatoff: 0.0,
                    temp_diff,
                    temp_plateau: temp_initial + temp_diff,
                    start_idx: 0,
                    end_idx: 10,
                    plateau_idx: 30,
                    group_id: 0,
                    start_lag: 4.0,
                    stop_lag: 30.0,
                    max_1s_temp_diff: 0.5,
                }
            })
            .collect();

        let (model, score) = fit_heat_sum_model(&sessions, 0.2).expect("fit");
        assert!((model.coefficients[2] - 40.0).abs() < 1e-6);
        assert!(score.r2 > 0.999);
    }
}
