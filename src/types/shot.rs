//! Extraction experiment types: ShotWindow, ThermofilterReading, ExtractionShot

use serde::{Deserialize, Serialize};

use super::{Measurement, Millis};

/// Time window of one pulled shot (ms since epoch, both ends inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotWindow {
    pub start_time: Millis,
    pub end_time: Millis,
}

impl ShotWindow {
    pub fn new(start_time: Millis, end_time: Millis) -> Self {
        Self { start_time, end_time }
    }

    pub fn contains(&self, time: Millis) -> bool {
        (self.start_time..=self.end_time).contains(&time)
    }
}

/// Reading from the thermofilter logger placed in the portafilter basket.
///
/// The logger's JSON export names the fields `timestamp` and `value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermofilterReading {
    #[serde(alias = "timestamp")]
    pub time: Millis,
    #[serde(alias = "value")]
    pub temp_c: f64,
}

impl ThermofilterReading {
    pub fn new(time: Millis, temp_c: f64) -> Self {
        Self { time, temp_c }
    }
}

/// Controller telemetry joined with thermofilter readings for one shot.
///
/// Row times are offsets from the first kept row; every row carries
/// `thermofilter_temp_c`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionShot {
    /// Shot start (ms since epoch), identifies the shot
    pub start_time: Millis,
    pub rows: Vec<Measurement>,
}

/// Peak temperatures of one shot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub start_time: Millis,
    pub max_grouphead_temp_c: f64,
    pub max_boiler_temp_c: f64,
    pub max_thermofilter_temp_c: f64,
}
