//! CSV ingestion and export
//!
//! Input columns (header row required, any order, extra columns ignored):
//!
//! | column               | type          | required |
//! |----------------------|---------------|----------|
//! | `time`               | ms since epoch| yes      |
//! | `boiler_temp_c`      | f64           | yes      |
//! | `grouphead_temp_c`   | f64           | yes      |
//! | `heat_level`         | f64 in [0, 1] | yes      |
//! | `thermofilter_temp_c`| f64           | no       |
//! | `target_temp_c`      | f64           | no       |
//! | `power`              | bool          | no       |
//!
//! Empty cells in optional columns read as missing.
//!
//! Extraction experiments add two inputs: thermofilter logs (headerless
//! `time,temp` CSV or a JSON array of `{timestamp, value}`) and a shot table
//! with `start_time,end_time` columns.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::segmentation::gap_stats;
use crate::types::{Measurement, MeasurementSeries, Millis, ShotWindow, ThermofilterReading};

pub const REQUIRED_COLUMNS: [&str; 4] = ["time", "boiler_temp_c", "grouphead_temp_c", "heat_level"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to open {}: {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("CSV error in {}: {1}", .0.display())]
    Csv(PathBuf, #[source] csv::Error),

    #[error("JSON error in {}: {1}", .0.display())]
    Json(PathBuf, #[source] serde_json::Error),

    #[error("{}: missing required column '{1}'", .0.display())]
    MissingColumn(PathBuf, &'static str),

    #[error("{}: row {row}: invalid {field} value '{value}'", .path.display())]
    InvalidValue {
        path: PathBuf,
        row: u64,
        field: &'static str,
        value: String,
    },
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    time: Millis,
    boiler_temp_c: f64,
    grouphead_temp_c: f64,
    heat_level: f64,
    #[serde(default)]
    thermofilter_temp_c: Option<f64>,
    #[serde(default)]
    target_temp_c: Option<f64>,
    #[serde(default)]
    power: Option<String>,
}

fn parse_power(raw: &str) -> Option<Option<bool>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Some(None),
        "true" | "1" | "on" => Some(Some(true)),
        "false" | "0" | "off" => Some(Some(false)),
        _ => None,
    }
}

/// Read measurements from any CSV source. `path` is only used in errors.
pub fn read_measurements<R: Read>(reader: R, path: &Path) -> Result<Vec<Measurement>, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| IngestError::Csv(path.to_path_buf(), e))?
        .clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(IngestError::MissingColumn(path.to_path_buf(), column));
        }
    }

    let mut rows = Vec::new();
    for (idx, record) in csv_reader.deserialize::<CsvRow>().enumerate() {
        let row = record.map_err(|e| IngestError::Csv(path.to_path_buf(), e))?;
        let power = match row.power.as_deref() {
            None => None,
            Some(raw) => parse_power(raw).ok_or_else(|| IngestError::InvalidValue {
                path: path.to_path_buf(),
                row: idx as u64 + 1,
                field: "power",
                value: raw.to_string(),
            })?,
        };
        if !(0.0..=1.0).contains(&row.heat_level) {
            return Err(IngestError::InvalidValue {
                path: path.to_path_buf(),
                row: idx as u64 + 1,
                field: "heat_level",
                value: row.heat_level.to_string(),
            });
        }
        rows.push(Measurement {
            time: row.time,
            boiler_temp_c: row.boiler_temp_c,
            grouphead_temp_c: row.grouphead_temp_c,
            thermofilter_temp_c: row.thermofilter_temp_c,
            heat_level: row.heat_level,
            target_temp_c: row.target_temp_c,
            power,
        });
    }

    debug!(path = %path.display(), rows = rows.len(), "Parsed measurement CSV");
    Ok(rows)
}

/// Load one CSV file into an ordered, de-duplicated series.
pub fn load_csv(path: &Path) -> Result<MeasurementSeries, IngestError> {
    load_csv_files(&[path.to_path_buf()], false)
}

/// Load several files into one series. Later files win timestamp collisions.
pub fn load_csv_files(paths: &[PathBuf], powered_only: bool) -> Result<MeasurementSeries, IngestError> {
    let mut series = MeasurementSeries::default();
    let mut raw_count = 0;
    for path in paths {
        let file = File::open(path).map_err(|e| IngestError::Io(path.clone(), e))?;
        let rows = read_measurements(file, path)?;
        raw_count += rows.len();
        series = series.merge(MeasurementSeries::from_rows(rows));
    }

    if powered_only {
        series = series.powered_only();
    }

    let span = series.time_range();
    let gaps = gap_stats(series.rows());
    info!(
        files = paths.len(),
        raw_rows = raw_count,
        rows = series.len(),
        powered_only,
        first_ms = ?span.map(|(first, _)| first),
        last_ms = ?span.map(|(_, last)| last),
        largest_gap_ms = ?gaps.map(|g| g.largest_ms),
        mean_gap_ms = ?gaps.map(|g| g.mean_ms),
        smallest_gap_ms = ?gaps.map(|g| g.smallest_ms),
        "Loaded measurements"
    );
    Ok(series)
}

// ============================================================================
// Extraction experiment inputs
// ============================================================================

/// Headerless `time,thermofilter_temp_c` rows.
pub fn read_thermofilter_csv<R: Read>(reader: R, path: &Path) -> Result<Vec<ThermofilterReading>, IngestError> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader)
        .deserialize::<(Millis, f64)>()
        .map(|record| {
            record
                .map(|(time, temp_c)| ThermofilterReading::new(time, temp_c))
                .map_err(|e| IngestError::Csv(path.to_path_buf(), e))
        })
        .collect()
}

/// JSON array of `{"timestamp": ms, "value": °C}` objects.
pub fn read_thermofilter_json<R: Read>(reader: R, path: &Path) -> Result<Vec<ThermofilterReading>, IngestError> {
    serde_json::from_reader(BufReader::new(reader)).map_err(|e| IngestError::Json(path.to_path_buf(), e))
}

/// Load thermofilter logs, `.json` by extension and CSV otherwise.
///
/// Sorted by time. On duplicate timestamps the reading from the earliest
/// file in `paths` is kept.
pub fn load_thermofilter_files(paths: &[PathBuf]) -> Result<Vec<ThermofilterReading>, IngestError> {
    let mut readings = Vec::new();
    for path in paths {
        let file = File::open(path).map_err(|e| IngestError::Io(path.clone(), e))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            read_thermofilter_json(file, path)?
        } else {
            read_thermofilter_csv(file, path)?
        };
        debug!(path = %path.display(), readings = parsed.len(), "Parsed thermofilter log");
        readings.extend(parsed);
    }

    let raw_count = readings.len();
    readings.sort_by_key(|r| r.time);
    readings.dedup_by_key(|r| r.time);

    info!(files = paths.len(), raw_readings = raw_count, readings = readings.len(), "Loaded thermofilter readings");
    Ok(readings)
}

/// Shot table with `start_time` and `end_time` columns, sorted by start.
pub fn read_shots<R: Read>(reader: R, path: &Path) -> Result<Vec<ShotWindow>, IngestError> {
    let mut shots = Vec::new();
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    for (idx, record) in csv_reader.deserialize::<ShotWindow>().enumerate() {
        let shot = record.map_err(|e| IngestError::Csv(path.to_path_buf(), e))?;
        if shot.end_time < shot.start_time {
            return Err(IngestError::InvalidValue {
                path: path.to_path_buf(),
                row: idx as u64 + 1,
                field: "end_time",
                value: shot.end_time.to_string(),
            });
        }
        shots.push(shot);
    }
    shots.sort_by_key(|s| s.start_time);
    Ok(shots)
}

pub fn load_shots(path: &Path) -> Result<Vec<ShotWindow>, IngestError> {
    let file = File::open(path).map_err(|e| IngestError::Io(path.to_path_buf(), e))?;
    let shots = read_shots(file, path)?;
    info!(path = %path.display(), shots = shots.len(), "Loaded shots");
    Ok(shots)
}

/// Write any serializable table as CSV with a header row.
pub fn write_csv_to<W: Write, T: Serialize>(writer: W, rows: &[T]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), IngestError> {
    let file = File::create(path).map_err(|e| IngestError::Io(path.to_path_buf(), e))?;
    write_csv_to(file, rows).map_err(|e| IngestError::Csv(path.to_path_buf(), e))?;
    info!(path = %path.display(), rows = rows.len(), "Wrote CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
time,boiler_temp_c,grouphead_temp_c,heat_level,power,target_temp_c
2000,91.5,80.0,0.0,True,93
1000,90.0,79.5,1.0,true,
2000,92.0,80.5,0.5,false,93
";

    #[test]
    fn test_read_sorts_and_dedups() {
        let rows = read_measurements(SAMPLE.as_bytes(), Path::new("sample.csv")).expect("parse");
        assert_eq!(rows.len(), 3);
        let series = MeasurementSeries::from_rows(rows);
        assert_eq!(series.len(), 2);
        assert_eq!(series.rows()[0].time, 1_000);
        assert_eq!(series.rows()[0].target_temp_c, None);
        assert_eq!(series.rows()[1].boiler_temp_c, 92.0);
        assert_eq!(series.rows()[1].power, Some(false));
        assert_eq!(series.rows()[1].thermofilter_temp_c, None);
    }

    #[test]
    fn test_missing_required_column() {
        let csv = "time,boiler_temp_c,heat_level\n0,90,0\n";
        match read_measurements(csv.as_bytes(), Path::new("bad.csv")) {
            Err(IngestError::MissingColumn(_, column)) => assert_eq!(column, "grouphead_temp_c"),
            other => panic!("expected missing column, got {other:?}"),
        }
    }

    #[test]
    fn test_heat_level_out_of_range() {
        let csv = "time,boiler_temp_c,grouphead_temp_c,heat_level\n0,90,80,1.5\n";
        assert!(matches!(
            read_measurements(csv.as_bytes(), Path::new("bad.csv")),
            Err(IngestError::InvalidValue { field: "heat_level", .. })
        ));
    }

    #[test]
    fn test_later_files_win_collisions() {
        let dir = tempfile::tempdir().expect("temp dir");
        let first = dir.path().join("a.csv");
        let second = dir.path().join("b.csv");
        std::fs::write(&first, "time,boiler_temp_c,grouphead_temp_c,heat_level\n1000,90,80,0\n2000,91,80,0\n")
            .expect("write");
        std::fs::write(&second, "time,boiler_temp_c,grouphead_temp_c,heat_level\n2000,95,81,1\n3000,96,81,0\n")
            .expect("write");

        let series = load_csv_files(&[first, second], false).expect("load");
        assert_eq!(series.time_range(), Some((1_000, 3_000)));
        assert_eq!(series.len(), 3);
        assert_eq!(series.rows()[1].boiler_temp_c, 95.0);
    }

    #[test]
    fn test_thermofilter_formats() {
        let csv = "1000, 88.5\n1100,89.0\n";
        let from_csv = read_thermofilter_csv(csv.as_bytes(), Path::new("aux.csv")).expect("csv");
        assert_eq!(from_csv, vec![ThermofilterReading::new(1_000, 88.5), ThermofilterReading::new(1_100, 89.0)]);

        let json = r#"[{"timestamp": 1200, "value": 90.5}]"#;
        let from_json = read_thermofilter_json(json.as_bytes(), Path::new("aux.json")).expect("json");
        assert_eq!(from_json, vec![ThermofilterReading::new(1_200, 90.5)]);
    }

    #[test]
    fn test_thermofilter_duplicates_keep_first_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let csv = dir.path().join("aux.csv");
        let json = dir.path().join("aux.JSON");
        std::fs::write(&csv, "2000,91.0\n1000,90.0\n").expect("write");
        std::fs::write(&json, r#"[{"timestamp": 2000, "value": 99.0}, {"timestamp": 3000, "value": 92.0}]"#)
            .expect("write");

        let readings = load_thermofilter_files(&[csv, json]).expect("load");
        let pairs: Vec<(Millis, f64)> = readings.iter().map(|r| (r.time, r.temp_c)).collect();
        assert_eq!(pairs, vec![(1_000, 90.0), (2_000, 91.0), (3_000, 92.0)]);
    }

    #[test]
    fn test_shots_sorted_and_validated() {
        let csv = "id,start_time,end_time\n2,5000,9000\n1,1000,4000\n";
        let shots = read_shots(csv.as_bytes(), Path::new("shots.csv")).expect("shots");
        assert_eq!(shots, vec![ShotWindow::new(1_000, 4_000), ShotWindow::new(5_000, 9_000)]);

        let reversed = "start_time,end_time\n5000,4000\n";
        assert!(matches!(
            read_shots(reversed.as_bytes(), Path::new("shots.csv")),
            Err(IngestError::InvalidValue { field: "end_time", .. })
        ));
    }

    #[test]
    fn test_write_csv_has_header() {
        let mut out = Vec::new();
        write_csv_to(&mut out, &[Measurement::new(0, 90.0, 80.0, 1.0)]).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("time,boiler_temp_c,grouphead_temp_c,thermofilter_temp_c,heat_level"));
    }
}
