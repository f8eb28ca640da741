//! Live telemetry client core
//!
//! Transport-independent pieces of the remote-control client:
//!
//! - **sensors**: sensor identities, readings, and bounded per-sensor history
//! - **feed**: single-writer task owning the histories, `watch` snapshots,
//!   and temperature waits with timeout and cancellation
//! - **history**: correlated request/response for logged measurement history
//! - **commands**: remote commands with their topics and payloads
//! - **replay**: reading sources and the pump that drives the feed
//!
//! The broker connection plugs in through [`CommandPublisher`] for outgoing
//! messages and [`ReadingSender`] / [`HistoryRequester::handle_response`] for
//! incoming ones.

use std::time::Duration;

use thiserror::Error;

pub mod commands;
pub mod feed;
pub mod history;
pub mod replay;
pub mod sensors;

pub use commands::{CommandPublisher, ControlMethod, MachineMode, RemoteCommand};
pub use feed::{LiveFeed, LiveSnapshot, ReadingSender, TempCondition};
pub use history::{HistoryQuery, HistoryRequest, HistoryRequester, HistoryResponse, HistoryRow};
pub use replay::{pump, ReadingSource, ReplaySource};
pub use sensors::{SensorHistory, SensorKind, SensorReading};

#[derive(Debug, Error)]
pub enum LiveError {
    #[error("unknown sensor '{0}' (expected boiler, grouphead or thermofilter)")]
    UnknownSensor(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("live feed channel closed")]
    ChannelClosed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
