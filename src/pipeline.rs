//! Batch analysis drivers
//!
//! Wire the pure segmentation and modeling stages into the two analyses run
//! from the CLI:
//!
//! - **Heat sessions**: continuity grouping, forward-fill upsampling, session
//!   extraction, pruning, per-measurement feature rows
//! - **Thermal loss**: time-gap grouping, fail-fast resampling, per-sensor
//!   delta models, trajectory simulation
//!
//! Groups that fail to resample are logged and skipped; nothing is retried.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::modeling::{
    predict_series, train_thermal_loss, CorrelationCandidate, CorrelationEngine, ModelError, ThermalLossModel,
};
use crate::segmentation::{
    extract_heat_sessions, group_by_temperature_continuity, group_measurements, measurement_feature_rows,
    session_feature_rows, upsample_forward_fill, ResamplePeriod, SegmentationError, SessionFilter,
    SessionFilterResult,
};
use crate::types::{
    HeatSession, MeasurementFeatureRow, MeasurementSeries, Millis, PredictedPoint, ResampledSeries, ThermalState,
};

// ============================================================================
// Heat-session analysis
// ============================================================================

/// Output of the heat-session pipeline.
#[derive(Debug, Clone)]
pub struct SessionAnalysis {
    /// Continuity groups on the session grid, longest first
    pub groups: Vec<ResampledSeries>,
    pub skipped_groups: usize,
    /// Every session that survived lag detection
    pub sessions: Vec<HeatSession>,
    /// Sessions after pruning, with rejection counts
    pub filtered: SessionFilterResult,
}

impl SessionAnalysis {
    pub fn group(&self, group_id: usize) -> Option<&ResampledSeries> {
        self.groups.iter().find(|g| g.group_id == group_id)
    }
}

/// Continuity-group a series and upsample every group onto the session grid.
pub fn session_groups(
    series: &MeasurementSeries,
    config: &AnalysisConfig,
) -> Result<(Vec<ResampledSeries>, usize), SegmentationError> {
    let period: ResamplePeriod = config.resampling.session_period.parse()?;
    let groups = group_by_temperature_continuity(series, &config.continuity);

    let mut resampled = Vec::with_capacity(groups.len());
    let mut skipped = 0;
    for group in &groups {
        match upsample_forward_fill(group, &period) {
            Ok(s) => resampled.push(s),
            Err(e) => {
                warn!(group = group.id, error = %e, "Skipping group");
                skipped += 1;
            }
        }
    }

    info!(
        rows = series.len(),
        groups = resampled.len(),
        skipped,
        period = %period,
        "Prepared session groups"
    );
    Ok((resampled, skipped))
}

/// Run the heat-session pipeline end to end.
pub fn analyze_sessions(
    series: &MeasurementSeries,
    config: &AnalysisConfig,
) -> Result<SessionAnalysis, SegmentationError> {
    let (groups, skipped_groups) = session_groups(series, config)?;

    let sessions: Vec<HeatSession> = groups
        .iter()
        .flat_map(|g| extract_heat_sessions(g, &config.sessions))
        .collect();
    let filtered = SessionFilter::new(&config.filters).apply(sessions.clone());

    info!(
        sessions = sessions.len(),
        kept = filtered.kept.len(),
        rejected = filtered.rejected(),
        primary_reason = ?filtered.primary_reason(),
        "Heat-session analysis complete"
    );

    Ok(SessionAnalysis {
        groups,
        skipped_groups,
        sessions,
        filtered,
    })
}

/// Feature rows around every kept session.
pub fn session_training_rows(analysis: &SessionAnalysis, config: &AnalysisConfig) -> Vec<MeasurementFeatureRow> {
    analysis
        .filtered
        .kept
        .iter()
        .filter_map(|session| {
            let group = analysis.group(session.group_id)?;
            Some(session_feature_rows(
                group,
                session,
                config.features.session_future_shift_ms,
            ))
        })
        .flatten()
        .collect()
}

/// Feature rows over every group with the configured window and shift.
pub fn group_training_rows(groups: &[ResampledSeries], config: &AnalysisConfig) -> Vec<MeasurementFeatureRow> {
    groups
        .iter()
        .flat_map(|g| {
            measurement_feature_rows(
                g,
                config.features.rolling_heat_window_ms,
                config.features.future_shift_ms,
            )
        })
        .collect()
}

/// Correlation grid over the configured window and shift ranges.
pub fn correlation_search(groups: &[ResampledSeries], config: &AnalysisConfig) -> Vec<CorrelationCandidate> {
    let results = CorrelationEngine::search(
        groups,
        config.features.search_window_range_ms,
        config.features.search_shift_range_ms,
    );
    if let Some(best) = results.first() {
        info!(
            cells = results.len(),
            window_ms = best.window_ms,
            shift_ms = best.shift_ms,
            r = best.r_value,
            p = best.p_value,
            "Correlation search complete"
        );
    }
    results
}

// ============================================================================
// Thermal-loss analysis
// ============================================================================

/// Trained thermal-loss models and the trajectories they simulate.
#[derive(Debug, Clone, Serialize)]
pub struct ThermalLossRun {
    pub model: ThermalLossModel,
    /// Per-sensor model trajectory
    pub trajectory: Vec<PredictedPoint>,
    /// Joint model trajectory
    pub joint_trajectory: Vec<PredictedPoint>,
}

/// Group cool-down episodes, train at the configured period, and simulate
/// the configured number of steps from the configured initial state.
pub fn run_thermal_loss(
    series: &MeasurementSeries,
    config: &AnalysisConfig,
    start_time: Millis,
) -> Result<ThermalLossRun, ModelError> {
    let groups = group_measurements(series, &config.grouping);
    info!(rows = series.len(), groups = groups.len(), "Grouped cool-down episodes");

    let period: ResamplePeriod = config.resampling.thermal_loss_period.parse()?;
    let model = train_thermal_loss(&groups, &period, config.prediction.holdout_fraction)?;

    let p = &config.prediction;
    let initial = ThermalState::new(p.initial_boiler_c, p.initial_grouphead_c);
    let trajectory = predict_series(&model.per_sensor, initial, start_time, p.time_increment_ms, p.steps)?;
    let joint_trajectory = predict_series(&model.joint, initial, start_time, p.time_increment_ms, p.steps)?;

    Ok(ThermalLossRun {
        model,
        trajectory,
        joint_trajectory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Measurement;

    /// 1 Hz rows: idle, 10 s of heat with a delayed first-order rise, idle.
    fn heated_series(pulses: usize) -> MeasurementSeries {
        let mut rows = Vec::new();
        let mut temp = 90.0;
        let mut t = 0;
        rows.push(Measurement::new(t, temp, 80.0, 0.0));
        for _ in 0..pulses {
            for i in 0..150 {
                t += 1_000;
                let heating = (10..20).contains(&i);
                if (13..40).contains(&i) {
                    temp += 0.3;
                } else if i >= 40 {
                    temp -= 0.03;
                }
                rows.push(Measurement::new(t, temp, 80.0, if heating { 1.0 } else { 0.0 }));
            }
        }
        MeasurementSeries::from_rows(rows)
    }

    fn test_config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.continuity.min_group_len = 10;
        config.resampling.session_period = "1s".to_string();
        config
    }

    #[test]
    fn test_analyze_sessions_finds_every_pulse() {
        let series = heated_series(3);
        let analysis = analyze_sessions(&series, &test_config()).expect("analysis");

        assert_eq!(analysis.groups.len(), 1);
        assert_eq!(analysis.sessions.len(), 3);
        for s in &analysis.sessions {
            assert_eq!(s.end_idx - s.start_idx, 10);
            assert!(s.start_lag > 0.0);
            assert!(s.temp_diff > 0.0);
        }
    }

    #[test]
    fn test_session_training_rows_cover_kept_sessions() {
        let mut config = test_config();
        config.filters = Default::default();
        config.filters.min_stop_lag_s = None;
        config.filters.max_stop_lag_s = None;
        let analysis = analyze_sessions(&heated_series(2), &config).expect("analysis");
        assert!(!analysis.filtered.kept.is_empty());

        let rows = session_training_rows(&analysis, &config);
        assert!(!rows.is_empty());
        // Rolling window is the 3 s start lag
        assert!(rows.iter().all(|r| r.rolling_heat_level <= 3.0));
    }

    #[test]
    fn test_invalid_session_period_is_reported() {
        let mut config = test_config();
        config.resampling.session_period = "fast".to_string();
        assert!(matches!(
            analyze_sessions(&heated_series(1), &config),
            Err(SegmentationError::InvalidPeriod(_))
        ));
    }

    #[test]
    fn test_thermal_loss_run_produces_trajectories() {
        let rows: Vec<Measurement> = (0..3)
            .flat_map(|episode| {
                let offset = episode * 20_000_000;
                (0..2_000).map(move |i| {
                    let t = i as f64 * 5.0;
                    Measurement::new(
                        offset + i * 5_000,
                        22.0 + 73.0 * (-t / 2_000.0).exp(),
                        22.0 + 60.0 * (-t / 3_000.0).exp(),
                        0.0,
                    )
                })
            })
            .collect();
        let series = MeasurementSeries::from_rows(rows);

        let mut config = AnalysisConfig::default();
        config.resampling.thermal_loss_period = "1m".to_string();
        config.prediction.steps = 10;

        let run = run_thermal_loss(&series, &config, 0).expect("thermal loss");
        assert_eq!(run.model.groups_used, 3);
        assert_eq!(run.trajectory.len(), 11);
        assert_eq!(run.joint_trajectory.len(), 11);
        // Cooling toward ambient
        assert!(run.trajectory[10].boiler_temp_c < run.trajectory[0].boiler_temp_c);
        for (a, b) in run.trajectory.iter().zip(&run.joint_trajectory) {
            assert!((a.boiler_temp_c - b.boiler_temp_c).abs() < 1e-9);
        }
    }
}
