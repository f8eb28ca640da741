//! Reading sources for the live feed
//!
//! A [`ReadingSource`] yields batches of sensor readings; [`pump`] forwards
//! them into a [`LiveFeed`](super::LiveFeed) until the source ends or the
//! cancellation token fires. [`ReplaySource`] replays logged measurements,
//! which makes the live path testable without a broker.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::feed::ReadingSender;
use super::sensors::{SensorKind, SensorReading};
use super::LiveError;
use crate::types::Measurement;

/// Anything that produces sensor readings.
#[async_trait]
pub trait ReadingSource: Send {
    /// Next batch of readings, or `None` once the source is exhausted.
    async fn next_readings(&mut self) -> Result<Option<Vec<SensorReading>>, LiveError>;

    fn source_name(&self) -> &str;
}

/// Replays logged measurements, one row per batch.
pub struct ReplaySource {
    rows: std::vec::IntoIter<Measurement>,
    delay: Duration,
    yielded_first: bool,
}

impl ReplaySource {
    /// `delay` is waited between rows; zero replays as fast as possible.
    pub fn new(rows: Vec<Measurement>, delay: Duration) -> Self {
        Self {
            rows: rows.into_iter(),
            delay,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl ReadingSource for ReplaySource {
    async fn next_readings(&mut self) -> Result<Option<Vec<SensorReading>>, LiveError> {
        if self.yielded_first && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.rows.next().map(|m| {
            self.yielded_first = true;
            SensorKind::ALL
                .iter()
                .filter_map(|&sensor| Some(SensorReading::new(sensor, m.time, sensor.value_in(&m)?)))
                .collect()
        }))
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

/// Forward readings from `source` into the feed.
///
/// Returns the number of readings forwarded. Cancellation ends the pump
/// cleanly; a closed feed is an error.
pub async fn pump<S>(source: &mut S, sender: &ReadingSender, cancel: &CancellationToken) -> Result<u64, LiveError>
where
    S: ReadingSource + ?Sized,
{
    let mut forwarded = 0u64;
    info!(source = source.source_name(), "Forwarding readings to live feed");

    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => {
                info!(forwarded, "Reading pump cancelled");
                return Ok(forwarded);
            }
            batch = source.next_readings() => batch?,
        };
        let Some(readings) = batch else {
            break;
        };
        for reading in readings {
            sender.send(reading).await?;
            forwarded += 1;
        }
    }

    info!(forwarded, source = source.source_name(), "Reading source exhausted");
    Ok(forwarded)
}
