//! Extraction temperature
//!
//! Lines up thermofilter readings with controller telemetry for each pulled
//! shot, then fits the water temperature at the puck from
//! `[grouphead, boiler]`.
//!
//! Per shot:
//!
//! 1. thermofilter readings and measurements inside the shot window
//! 2. both forward-filled onto the extraction grid
//! 3. joined on grid label
//! 4. cropped from the thermofilter peak (before it the filter is still
//!    warming up to the water) to `tail_trim_samples` before the end
//! 5. times rebased so the first row is 0

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::dataset::RegressionDataset;
use super::regression::{fit_and_evaluate, LinearModel};
use super::ModelError;
use crate::config::ExtractionConfig;
use crate::segmentation::grouping::first_argmax;
use crate::segmentation::{upsample_forward_fill, ResamplePeriod};
use crate::types::{
    ExtractionShot, ExtractionSummary, FitScore, Measurement, MeasurementGroup, MeasurementSeries, Millis,
    ShotWindow, ThermofilterReading,
};

/// Forward-fill sorted readings onto every grid label between the first and
/// last readings. Labels before the first reading are dropped.
fn forward_fill_readings(readings: &[ThermofilterReading], period_ms: Millis) -> BTreeMap<Millis, f64> {
    let mut filled = BTreeMap::new();
    let (Some(first), Some(last)) = (readings.first(), readings.last()) else {
        return filled;
    };

    let mut label = first.time.div_euclid(period_ms) * period_ms;
    let end = last.time.div_euclid(period_ms) * period_ms;
    let mut cursor = 0;
    let mut held: Option<f64> = None;

    while label <= end {
        while let Some(r) = readings.get(cursor).filter(|r| r.time <= label) {
            held = Some(r.temp_c);
            cursor += 1;
        }
        if let Some(temp) = held {
            filled.insert(label, temp);
        }
        label += period_ms;
    }
    filled
}

fn align_shot(
    idx: usize,
    window: ShotWindow,
    readings: &[ThermofilterReading],
    series: &MeasurementSeries,
    period: &ResamplePeriod,
    tail_trim_samples: usize,
) -> Option<ExtractionShot> {
    let shot_readings: Vec<ThermofilterReading> =
        readings.iter().copied().filter(|r| window.contains(r.time)).collect();
    if shot_readings.is_empty() {
        debug!(start_time = window.start_time, "No thermofilter readings, skipping shot");
        return None;
    }

    let shot_rows: Vec<Measurement> = series.rows().iter().copied().filter(|m| window.contains(m.time)).collect();
    if shot_rows.is_empty() {
        debug!(start_time = window.start_time, "No measurements, skipping shot");
        return None;
    }

    let upsampled = match upsample_forward_fill(&MeasurementGroup::new(idx, shot_rows), period) {
        Ok(u) => u,
        Err(e) => {
            warn!(start_time = window.start_time, error = %e, "Skipping shot");
            return None;
        }
    };
    let thermofilter = forward_fill_readings(&shot_readings, upsampled.period_ms);

    let joined: Vec<Measurement> = upsampled
        .rows
        .iter()
        .filter(|m| m.boiler_temp_c.is_finite() && m.grouphead_temp_c.is_finite())
        .filter_map(|m| {
            thermofilter.get(&m.time).map(|&temp| Measurement {
                thermofilter_temp_c: Some(temp),
                ..*m
            })
        })
        .collect();

    let peak = first_argmax(joined.iter().filter_map(|m| m.thermofilter_temp_c))?;
    let end = joined.len().saturating_sub(tail_trim_samples);
    let cropped = joined.get(peak..end).filter(|rows| !rows.is_empty())?;

    let origin = cropped[0].time;
    Some(ExtractionShot {
        start_time: window.start_time,
        rows: cropped.iter().map(|m| m.at(m.time - origin)).collect(),
    })
}

/// Align thermofilter readings with telemetry for every shot.
///
/// Shots without readings, without telemetry, or with nothing left after
/// cropping are skipped. `readings` must be sorted by time.
pub fn extraction_shots(
    series: &MeasurementSeries,
    readings: &[ThermofilterReading],
    shots: &[ShotWindow],
    cfg: &ExtractionConfig,
) -> Result<Vec<ExtractionShot>, ModelError> {
    let period: ResamplePeriod = cfg.period.parse()?;

    let aligned: Vec<ExtractionShot> = shots
        .iter()
        .enumerate()
        .filter_map(|(idx, &window)| align_shot(idx, window, readings, series, &period, cfg.tail_trim_samples))
        .collect();

    info!(
        shots = shots.len(),
        aligned = aligned.len(),
        rows = aligned.iter().map(|s| s.rows.len()).sum::<usize>(),
        "Aligned extraction shots"
    );
    Ok(aligned)
}

/// Peak temperatures per shot, hottest `grouphead + boiler` first.
pub fn summarize_shots(shots: &[ExtractionShot]) -> Vec<ExtractionSummary> {
    let mut table: Vec<ExtractionSummary> = shots
        .iter()
        .filter(|s| !s.rows.is_empty())
        .map(|s| {
            let max = |f: fn(&Measurement) -> f64| s.rows.iter().map(f).fold(f64::NEG_INFINITY, f64::max);
            ExtractionSummary {
                start_time: s.start_time,
                max_grouphead_temp_c: max(|m| m.grouphead_temp_c),
                max_boiler_temp_c: max(|m| m.boiler_temp_c),
                max_thermofilter_temp_c: max(|m| m.thermofilter_temp_c.unwrap_or(f64::NEG_INFINITY)),
            }
        })
        .collect();

    table.sort_by(|a, b| {
        let key = |s: &ExtractionSummary| s.max_grouphead_temp_c + s.max_boiler_temp_c;
        key(b).total_cmp(&key(a))
    });
    table
}

/// `[grouphead, boiler] -> thermofilter` over every aligned row.
pub fn extraction_dataset(shots: &[ExtractionShot]) -> Result<RegressionDataset, ModelError> {
    let (rows, targets): (Vec<Vec<f64>>, Vec<f64>) = shots
        .iter()
        .flat_map(|s| &s.rows)
        .filter_map(|m| {
            m.thermofilter_temp_c
                .map(|t| (vec![m.grouphead_temp_c, m.boiler_temp_c], t))
        })
        .unzip();

    if rows.is_empty() {
        return Err(ModelError::InsufficientSamples { needed: 1, found: 0 });
    }
    RegressionDataset::from_rows(
        vec!["grouphead_temp_c".to_string(), "boiler_temp_c".to_string()],
        "thermofilter_temp_c",
        rows,
        targets,
    )
}

/// Fit the extraction-temperature model with a chronological hold-out.
pub fn fit_extraction_model(
    shots: &[ExtractionShot],
    holdout_fraction: f64,
) -> Result<(LinearModel, FitScore), ModelError> {
    let dataset = extraction_dataset(shots)?;
    fit_and_evaluate(&dataset, holdout_fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ExtractionConfig {
        ExtractionConfig {
            period: "100ms".to_string(),
            tail_trim_samples: 10,
        }
    }

    /// Telemetry every 100 ms over [1000, 4000], boiler rising 0.1 °C per row.
    fn series() -> MeasurementSeries {
        MeasurementSeries::from_rows((0..=30).map(|i| Measurement::new(1_000 + i * 100, 90.0 + i as f64 * 0.1, 80.0, 0.0)))
    }

    /// Readings every 200 ms peaking at 1600, plus hotter readings outside the window.
    fn readings() -> Vec<ThermofilterReading> {
        let mut readings = vec![ThermofilterReading::new(500, 120.0)];
        readings.extend((0..=15).map(|i| {
            let t: Millis = 1_000 + i * 200;
            ThermofilterReading::new(t, 95.0 - (t - 1_600).abs() as f64 / 100.0)
        }));
        readings.push(ThermofilterReading::new(5_000, 120.0));
        readings
    }

    #[test]
    fn test_shot_is_cropped_from_thermofilter_peak() {
        let shots = extraction_shots(&series(), &readings(), &[ShotWindow::new(1_000, 4_000)], &cfg()).expect("align");
        assert_eq!(shots.len(), 1);
        let shot = &shots[0];
        assert_eq!(shot.start_time, 1_000);

        // 31 joined rows, peak at label 1600 (index 6), last 10 dropped
        assert_eq!(shot.rows.len(), 15);
        assert_eq!(shot.rows[0].time, 0);
        assert_eq!(shot.rows[14].time, 1_400);
        assert_eq!(shot.rows[0].thermofilter_temp_c, Some(95.0));
        // Label 1700 holds the 1600 reading
        assert_eq!(shot.rows[1].thermofilter_temp_c, Some(95.0));
        assert_eq!(shot.rows[2].thermofilter_temp_c, Some(93.0));
        assert!((shot.rows[0].boiler_temp_c - 90.6).abs() < 1e-9);
    }

    #[test]
    fn test_shots_without_readings_or_rows_are_skipped() {
        let windows = [
            // No readings in range
            ShotWindow::new(10_000, 10_500),
            // Five joined rows, all inside the trimmed tail
            ShotWindow::new(1_000, 1_500),
        ];
        let shots = extraction_shots(&series(), &readings(), &windows, &cfg()).expect("align");
        assert!(shots.is_empty());
    }

    #[test]
    fn test_invalid_period_is_an_error() {
        let bad = ExtractionConfig {
            period: "fast".to_string(),
            ..cfg()
        };
        assert!(matches!(
            extraction_shots(&series(), &readings(), &[], &bad),
            Err(ModelError::Segmentation(_))
        ));
    }

    #[test]
    fn test_forward_fill_readings_drops_leading_labels() {
        let filled = forward_fill_readings(
            &[ThermofilterReading::new(150, 90.0), ThermofilterReading::new(420, 92.0)],
            100,
        );
        assert_eq!(filled.into_iter().collect::<Vec<_>>(), vec![(200, 90.0), (300, 90.0), (400, 90.0)]);
    }

    fn shot(start_time: Millis, grouphead: f64, boiler: f64, thermofilter: f64) -> ExtractionShot {
        let mut row = Measurement::new(0, boiler, grouphead, 0.0);
        row.thermofilter_temp_c = Some(thermofilter);
        ExtractionShot {
            start_time,
            rows: vec![row, Measurement { time: 100, ..row }],
        }
    }

    #[test]
    fn test_summary_sorted_by_grouphead_plus_boiler() {
        let table = summarize_shots(&[shot(1, 80.0, 90.0, 85.0), shot(2, 85.0, 95.0, 90.0), shot(3, 70.0, 99.0, 80.0)]);
        let order: Vec<Millis> = table.iter().map(|s| s.start_time).collect();
        assert_eq!(order, vec![2, 1, 3]);
        assert_eq!(table[0].max_thermofilter_temp_c, 90.0);
    }

    #[test]
    fn test_extraction_dataset_maps_sensors_to_thermofilter() {
        let ds = extraction_dataset(&[shot(1, 80.0, 90.0, 85.0), shot(2, 85.0, 95.0, 90.0)]).expect("dataset");
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.feature_names, vec!["grouphead_temp_c", "boiler_temp_c"]);
        assert_eq!(ds.records.row(2).to_vec(), vec![85.0, 95.0]);
        assert_eq!(ds.targets[2], 90.0);
        assert!(matches!(extraction_dataset(&[]), Err(ModelError::InsufficientSamples { .. })));
    }
}
