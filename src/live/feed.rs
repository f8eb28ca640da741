//! Live sensor feed
//!
//! One writer task owns every [`SensorHistory`]. Producers push readings into
//! an mpsc channel; readers get the latest values through a `watch` snapshot
//! and full histories through a query message answered by the writer. No
//! buffer is ever shared mutably between tasks.
//!
//! ```text
//! transport ──mpsc──► writer task ──watch──► LiveSnapshot readers
//!                          ▲
//!          history query ──┘ (oneshot reply)
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::sensors::{SensorHistory, SensorKind, SensorReading};
use super::LiveError;

/// Channel depth between producers and the writer task.
const FEED_CHANNEL_CAPACITY: usize = 1024;

/// Latest reading per sensor, published after every update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveSnapshot {
    latest: [Option<SensorReading>; 3],
    /// Readings applied since the feed started
    pub sequence: u64,
}

impl LiveSnapshot {
    pub fn latest(&self, sensor: SensorKind) -> Option<SensorReading> {
        self.latest[sensor.index()]
    }
}

/// Condition on a sensor's latest reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempCondition {
    AtMost(f64),
    AtLeast(f64),
}

impl TempCondition {
    pub fn is_met(&self, value: f64) -> bool {
        match *self {
            TempCondition::AtMost(limit) => value <= limit,
            TempCondition::AtLeast(limit) => value >= limit,
        }
    }
}

enum FeedMessage {
    Reading(SensorReading),
    History {
        sensor: SensorKind,
        reply: oneshot::Sender<Vec<SensorReading>>,
    },
}

/// Cloneable producer handle.
#[derive(Clone)]
pub struct ReadingSender {
    tx: mpsc::Sender<FeedMessage>,
}

impl ReadingSender {
    pub async fn send(&self, reading: SensorReading) -> Result<(), LiveError> {
        self.tx
            .send(FeedMessage::Reading(reading))
            .await
            .map_err(|_| LiveError::ChannelClosed)
    }
}

/// Handle to a running feed.
pub struct LiveFeed {
    tx: mpsc::Sender<FeedMessage>,
    snapshots: watch::Receiver<LiveSnapshot>,
    task: JoinHandle<()>,
}

impl LiveFeed {
    /// Start the writer task. It runs until `cancel` fires or every sender
    /// (including this handle) is dropped.
    pub fn spawn(history_capacity: usize, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshots) = watch::channel(LiveSnapshot::default());
        let task = tokio::spawn(run_writer(rx, snapshot_tx, history_capacity, cancel));
        Self { tx, snapshots, task }
    }

    pub fn sender(&self) -> ReadingSender {
        ReadingSender { tx: self.tx.clone() }
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Copy of one sensor's buffered history, oldest first.
    pub async fn history(&self, sensor: SensorKind) -> Result<Vec<SensorReading>, LiveError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(FeedMessage::History { sensor, reply })
            .await
            .map_err(|_| LiveError::ChannelClosed)?;
        rx.await.map_err(|_| LiveError::ChannelClosed)
    }

    /// Wait until the sensor's latest reading satisfies `condition`.
    ///
    /// Returns the satisfying reading, or fails on timeout, cancellation, or
    /// when the feed stops.
    pub async fn wait_for_temp(
        &self,
        sensor: SensorKind,
        condition: TempCondition,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<SensorReading, LiveError> {
        let mut rx = self.snapshots.clone();
        let wait = async move {
            loop {
                let hit = rx
                    .borrow_and_update()
                    .latest(sensor)
                    .filter(|r| condition.is_met(r.value));
                if let Some(reading) = hit {
                    return Ok(reading);
                }
                if rx.changed().await.is_err() {
                    return Err(LiveError::ChannelClosed);
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(LiveError::Cancelled),
            result = tokio::time::timeout(timeout, wait) => {
                result.unwrap_or(Err(LiveError::Timeout(timeout)))
            }
        }
    }

    /// Stop accepting readings and wait for the writer to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            debug!(error = %e, "Feed writer task ended abnormally");
        }
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<FeedMessage>,
    snapshot_tx: watch::Sender<LiveSnapshot>,
    capacity: usize,
    cancel: CancellationToken,
) {
    let mut histories: [SensorHistory; 3] = std::array::from_fn(|_| SensorHistory::new(capacity));

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Live feed shutdown signal received");
                break;
            }
            message = rx.recv() => match message {
                Some(m) => m,
                None => break,
            },
        };

        match message {
            FeedMessage::Reading(reading) => {
                histories[reading.sensor.index()].push(reading);
                snapshot_tx.send_modify(|snap| {
                    snap.latest[reading.sensor.index()] = Some(reading);
                    snap.sequence += 1;
                });
            }
            FeedMessage::History { sensor, reply } => {
                // Receiver may have given up; nothing to do then
                let _ = reply.send(histories[sensor.index()].snapshot());
            }
        }
    }

    debug!(
        boiler = histories[0].len(),
        grouphead = histories[1].len(),
        thermofilter = histories[2].len(),
        "Live feed writer stopped"
    );
}
