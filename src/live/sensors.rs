//! Sensor identities and bounded per-sensor history

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::LiveError;
use crate::types::{Measurement, Millis};

/// Temperature sensors published by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Boiler,
    Grouphead,
    Thermofilter,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [SensorKind::Boiler, SensorKind::Grouphead, SensorKind::Thermofilter];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Boiler => "boiler",
            SensorKind::Grouphead => "grouphead",
            SensorKind::Thermofilter => "thermofilter",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            SensorKind::Boiler => 0,
            SensorKind::Grouphead => 1,
            SensorKind::Thermofilter => 2,
        }
    }

    /// Topic the controller publishes this sensor's readings on.
    pub fn topic(&self, prefix: &str) -> String {
        format!("{prefix}/temperature/{}", self.as_str())
    }

    /// Match an incoming topic back to a sensor.
    pub fn from_topic(prefix: &str, topic: &str) -> Option<Self> {
        let name = topic.strip_prefix(prefix)?.strip_prefix("/temperature/")?;
        name.parse().ok()
    }

    /// The reading for this sensor in a logged measurement, if recorded.
    pub fn value_in(&self, m: &Measurement) -> Option<f64> {
        match self {
            SensorKind::Boiler => Some(m.boiler_temp_c),
            SensorKind::Grouphead => Some(m.grouphead_temp_c),
            SensorKind::Thermofilter => m.thermofilter_temp_c,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = LiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boiler" => Ok(SensorKind::Boiler),
            "grouphead" => Ok(SensorKind::Grouphead),
            "thermofilter" => Ok(SensorKind::Thermofilter),
            other => Err(LiveError::UnknownSensor(other.to_string())),
        }
    }
}

/// One timestamped sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor: SensorKind,
    pub time: Millis,
    pub value: f64,
}

impl SensorReading {
    pub fn new(sensor: SensorKind, time: Millis, value: f64) -> Self {
        Self { sensor, time, value }
    }

    /// Parse a raw payload such as `"93.25"`.
    pub fn parse(sensor: SensorKind, time: Millis, payload: &str) -> Result<Self, LiveError> {
        let value: f64 = payload
            .trim()
            .parse()
            .map_err(|_| LiveError::InvalidPayload(payload.to_string()))?;
        Ok(Self::new(sensor, time, value))
    }
}

/// Ring buffer of the most recent readings for one sensor.
#[derive(Debug, Clone)]
pub struct SensorHistory {
    capacity: usize,
    readings: VecDeque<SensorReading>,
}

impl SensorHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            readings: VecDeque::with_capacity(capacity.min(4096)),
        }
    }

    /// Append a reading, evicting the oldest when full.
    pub fn push(&mut self, reading: SensorReading) {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    pub fn latest(&self) -> Option<SensorReading> {
        self.readings.back().copied()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshot(&self) -> Vec<SensorReading> {
        self.readings.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_parse_and_display() {
        assert_eq!("Boiler".parse::<SensorKind>().unwrap(), SensorKind::Boiler);
        assert_eq!(SensorKind::Thermofilter.to_string(), "thermofilter");
        assert!(matches!("steam".parse::<SensorKind>(), Err(LiveError::UnknownSensor(_))));
    }

    #[test]
    fn test_topic_round_trip() {
        for sensor in SensorKind::ALL {
            let topic = sensor.topic("gesha");
            assert_eq!(SensorKind::from_topic("gesha", &topic), Some(sensor));
        }
        assert_eq!(SensorKind::from_topic("gesha", "gesha/temperature/history"), None);
        assert_eq!(SensorKind::from_topic("gesha", "other/temperature/boiler"), None);
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = SensorHistory::new(3);
        for t in 0..5 {
            history.push(SensorReading::new(SensorKind::Boiler, t, 90.0 + t as f64));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.snapshot()[0].time, 2);
        assert_eq!(history.latest().map(|r| r.value), Some(94.0));
    }

    #[test]
    fn test_payload_parse() {
        let r = SensorReading::parse(SensorKind::Boiler, 5, " 93.25 ").expect("parse");
        assert_eq!(r.value, 93.25);
        assert!(SensorReading::parse(SensorKind::Boiler, 5, "hot").is_err());
    }
}
