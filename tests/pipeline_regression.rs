//! Pipeline Regression Tests
//!
//! Runs both analyses end to end on seeded synthetic traces, going through
//! CSV on disk the way the CLI does. Asserts on session counts and lags,
//! cool-down model sanity, and data integrity (no NaN values anywhere).

use gesha_analysis::config::{self, AnalysisConfig};
use gesha_analysis::ingest::{load_csv, load_csv_files, write_csv};
use gesha_analysis::modeling::{feature_row_dataset, fit_and_evaluate};
use gesha_analysis::pipeline::{analyze_sessions, group_training_rows, run_thermal_loss};
use gesha_analysis::simulation::{generate_trace, HeatPulse, TraceConfig};
use gesha_analysis::types::{Measurement, MeasurementSeries};

const PULSES: usize = 5;
const FIRST_PULSE_MS: i64 = 30_000;
const PULSE_SPACING_MS: i64 = 120_000;

fn ensure_config() {
    if !config::is_initialized() {
        config::init(AnalysisConfig::default());
    }
}

/// 12 minutes at 10 Hz with five full-power 12 s pulses, two minutes apart.
fn session_trace() -> Vec<Measurement> {
    generate_trace(&TraceConfig {
        seed: 11,
        duration_ms: 12 * 60 * 1000,
        initial_boiler_c: 90.0,
        initial_grouphead_c: 80.0,
        pulses: HeatPulse::evenly_spaced(PULSES, FIRST_PULSE_MS, PULSE_SPACING_MS, 12_000, 1.0),
        ..TraceConfig::default()
    })
    .expect("session trace")
}

/// Four hours of cooling at 0.1 Hz from a hot boiler.
fn cooldown_trace(seed: u64, start_time: i64) -> Vec<Measurement> {
    generate_trace(&TraceConfig {
        seed,
        start_time,
        period_ms: 10_000,
        duration_ms: 4 * 60 * 60 * 1000,
        initial_boiler_c: 95.0,
        initial_grouphead_c: 85.0,
        ..TraceConfig::default()
    })
    .expect("cooldown trace")
}

#[test]
fn csv_round_trip_preserves_rows() {
    let rows = session_trace();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("trace.csv");

    write_csv(&path, &rows).expect("write");
    let series = load_csv(&path).expect("load");
    assert_eq!(series.rows(), rows.as_slice());
}

#[test]
fn heat_sessions_match_simulated_pulses() {
    ensure_config();
    let rows = session_trace();
    let trace_start = rows[0].time;
    let series = MeasurementSeries::from_rows(rows);

    let analysis = analyze_sessions(&series, config::get()).expect("analysis");
    assert_eq!(analysis.groups.len(), 1, "trace has no discontinuities");
    assert_eq!(analysis.sessions.len(), PULSES);

    for (k, session) in analysis.sessions.iter().enumerate() {
        let group = analysis.group(session.group_id).expect("session group");
        let offset = group.rows[session.start_idx].time - trace_start;
        let pulse_start = FIRST_PULSE_MS + k as i64 * PULSE_SPACING_MS;
        assert_eq!(offset, pulse_start, "session {k} starts at its pulse");
        assert_eq!(session.end_idx - session.start_idx, 120, "12 s at 10 Hz");

        // Dead time alone is 3 s
        assert!(session.start_lag > 3.0 && session.start_lag < 20.0, "start lag {}", session.start_lag);
        assert!(session.stop_lag > 0.0);
        assert!(session.temp_diff > 0.0);
        assert!(session.temp_plateau >= session.temp_heatoff);
        assert!((session.heat_level_avg - 1.0).abs() < 1e-12);
    }
}

#[test]
fn feature_rows_are_finite_and_regressable() {
    ensure_config();
    let series = MeasurementSeries::from_rows(session_trace());
    let analysis = analyze_sessions(&series, config::get()).expect("analysis");

    let rows = group_training_rows(&analysis.groups, config::get());
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| {
        r.boiler_temp_c.is_finite() && r.rolling_heat_level.is_finite() && r.future_temp_diff.is_finite()
    }));

    let dataset = feature_row_dataset(&rows).expect("dataset");
    let (model, _score) = fit_and_evaluate(&dataset, 0.2).expect("fit");
    // More recent heat means a larger future rise
    assert!(model.coefficients[2] > 0.0, "coefficients {:?}", model.coefficients);
}

#[test]
fn thermal_loss_from_csv_files() {
    ensure_config();
    let dir = tempfile::tempdir().expect("temp dir");
    let first = dir.path().join("monday.csv");
    let second = dir.path().join("tuesday.csv");
    write_csv(&first, &cooldown_trace(1, 1_700_000_000_000)).expect("write");
    write_csv(&second, &cooldown_trace(2, 1_700_100_000_000)).expect("write");

    let series = load_csv_files(&[first, second], true).expect("load");
    let mut config = config::get().clone();
    config.prediction.steps = 24;
    // Start on the boiler/grouphead relation the cool-down data follows
    config.prediction.initial_boiler_c = 80.0;
    config.prediction.initial_grouphead_c = 73.0;

    let run = run_thermal_loss(&series, &config, 0).expect("thermal loss");
    assert_eq!(run.model.groups_used, 2);
    assert_eq!(run.model.skipped_groups, 0);
    assert!(run.model.boiler_score.r2 > 0.9, "r2 {}", run.model.boiler_score.r2);

    assert_eq!(run.trajectory.len(), 25);
    assert_eq!(run.trajectory[24].time, 24 * config.prediction.time_increment_ms);
    let boiler: Vec<f64> = run.trajectory.iter().map(|p| p.boiler_temp_c).collect();
    assert!(boiler.windows(2).all(|w| w[1] <= w[0] + 1e-6), "cooling is monotone: {boiler:?}");
    assert!(boiler[24] < 40.0 && boiler[24] > 15.0, "final boiler {}", boiler[24]);
}
