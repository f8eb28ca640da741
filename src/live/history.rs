//! Measurement history requests
//!
//! The controller answers a history command with one response message. Every
//! request carries a fresh id; the response echoes it so concurrent requests
//! never pick up each other's rows. A request that gets no answer within the
//! timeout, or whose caller cancels, is forgotten.

use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::commands::{CommandPublisher, RemoteCommand};
use super::LiveError;
use crate::types::{Measurement, Millis};

/// Parameters of one history query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryQuery {
    pub from: Millis,
    pub to: Millis,
    pub limit: Option<u32>,
    /// Aggregation bucket on the controller side (ms)
    pub bucket_size: Option<u32>,
}

/// Wire form of a history command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub id: Uuid,
    pub from: Millis,
    pub to: Millis,
    pub limit: Option<u32>,
    pub bucket_size: Option<u32>,
}

impl HistoryRequest {
    pub fn new(query: HistoryQuery) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: query.from,
            to: query.to,
            limit: query.limit,
            bucket_size: query.bucket_size,
        }
    }
}

/// One logged row as the controller reports it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRow {
    pub time: Millis,
    pub boiler_temp_c: f64,
    pub grouphead_temp_c: f64,
    pub heat_level: f64,
}

impl From<HistoryRow> for Measurement {
    fn from(row: HistoryRow) -> Self {
        Measurement::new(row.time, row.boiler_temp_c, row.grouphead_temp_c, row.heat_level)
    }
}

/// Wire form of a history response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub id: Uuid,
    pub rows: Vec<HistoryRow>,
}

/// Issues history commands and routes responses back to their callers.
pub struct HistoryRequester<P> {
    publisher: P,
    topic_prefix: String,
    timeout: Duration,
    pending: DashMap<Uuid, oneshot::Sender<Vec<Measurement>>>,
}

/// Removes a pending entry however the request ends.
struct PendingGuard<'a> {
    pending: &'a DashMap<Uuid, oneshot::Sender<Vec<Measurement>>>,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

impl<P: CommandPublisher> HistoryRequester<P> {
    pub fn new(publisher: P, topic_prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            publisher,
            topic_prefix: topic_prefix.into(),
            timeout,
            pending: DashMap::new(),
        }
    }

    /// Topic responses arrive on.
    pub fn response_topic(&self) -> String {
        format!("{}/temperature/history", self.topic_prefix)
    }

    /// Requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Send one history command and wait for its response.
    pub async fn fetch(
        &self,
        query: HistoryQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Measurement>, LiveError> {
        if query.to <= query.from {
            return Err(LiveError::InvalidPayload(format!(
                "empty history range {}..{}",
                query.from, query.to
            )));
        }

        let request = HistoryRequest::new(query);
        let id = request.id;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        RemoteCommand::RequestHistory(request)
            .send(&self.publisher, &self.topic_prefix)
            .await?;
        debug!(%id, from = query.from, to = query.to, "History request sent");

        tokio::select! {
            _ = cancel.cancelled() => Err(LiveError::Cancelled),
            result = tokio::time::timeout(self.timeout, rx) => match result {
                Ok(Ok(rows)) => Ok(rows),
                Ok(Err(_)) => Err(LiveError::ChannelClosed),
                Err(_) => {
                    warn!(%id, timeout_ms = self.timeout.as_millis() as u64, "History request timed out");
                    Err(LiveError::Timeout(self.timeout))
                }
            },
        }
    }

    /// Hand rows to the caller waiting on `id`. Returns false when nobody is
    /// waiting (late, duplicate, or foreign response).
    pub fn deliver(&self, id: Uuid, rows: Vec<Measurement>) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => tx.send(rows).is_ok(),
            None => {
                debug!(%id, "Dropping history response with no pending request");
                false
            }
        }
    }

    /// Decode a raw response payload and deliver it.
    pub fn handle_response(&self, payload: &str) -> Result<bool, LiveError> {
        let response: HistoryResponse = serde_json::from_str(payload)?;
        let rows = response.rows.into_iter().map(Measurement::from).collect();
        Ok(self.deliver(response.id, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Forwards every published message to the test.
    struct ChannelPublisher {
        tx: mpsc::UnboundedSender<(String, String)>,
    }

    #[async_trait]
    impl CommandPublisher for ChannelPublisher {
        async fn publish(&self, topic: &str, payload: String) -> Result<(), LiveError> {
            self.tx
                .send((topic.to_string(), payload))
                .map_err(|e| LiveError::Transport(e.to_string()))
        }
    }

    fn requester(timeout: Duration) -> (Arc<HistoryRequester<ChannelPublisher>>, mpsc::UnboundedReceiver<(String, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let requester = HistoryRequester::new(ChannelPublisher { tx }, "gesha", timeout);
        (Arc::new(requester), rx)
    }

    fn query() -> HistoryQuery {
        HistoryQuery {
            from: 1_000,
            to: 5_000,
            limit: Some(100),
            bucket_size: None,
        }
    }

    #[test]
    fn test_request_wire_format() {
        let request = HistoryRequest::new(HistoryQuery {
            from: 1,
            to: 2,
            limit: None,
            bucket_size: Some(500),
        });
        let json: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(json["from"], 1);
        assert_eq!(json["to"], 2);
        assert_eq!(json["bucketSize"], 500);
        assert!(json["limit"].is_null());
        assert!(json["id"].is_string());
    }

    #[test]
    fn test_row_decodes_camel_case() {
        let row: HistoryRow = serde_json::from_str(
            r#"{"time": 10, "boilerTempC": 93.5, "groupheadTempC": 80.0, "heatLevel": 0.4}"#,
        )
        .unwrap();
        let m = Measurement::from(row);
        assert_eq!(m.time, 10);
        assert_eq!(m.boiler_temp_c, 93.5);
        assert_eq!(m.heat_level, 0.4);
    }

    #[tokio::test]
    async fn test_fetch_receives_matching_response() {
        let (requester, mut published) = requester(Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let fetcher = {
            let requester = Arc::clone(&requester);
            tokio::spawn(async move { requester.fetch(query(), &cancel).await })
        };

        let (topic, payload) = published.recv().await.unwrap();
        assert_eq!(topic, "gesha/temperature/history/command");
        let request: HistoryRequest = serde_json::from_str(&payload).unwrap();

        // A foreign response is ignored
        assert!(!requester.deliver(Uuid::new_v4(), Vec::new()));

        let response = HistoryResponse {
            id: request.id,
            rows: vec![HistoryRow {
                time: 2_000,
                boiler_temp_c: 90.0,
                grouphead_temp_c: 78.0,
                heat_level: 1.0,
            }],
        };
        let delivered = requester
            .handle_response(&serde_json::to_string(&response).unwrap())
            .unwrap();
        assert!(delivered);

        let rows = fetcher.await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].time, 2_000);
        assert_eq!(requester.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_times_out_and_forgets_request() {
        let (requester, mut published) = requester(Duration::from_millis(200));
        let result = requester.fetch(query(), &CancellationToken::new()).await;

        assert!(matches!(result, Err(LiveError::Timeout(_))));
        assert_eq!(requester.pending_count(), 0);

        // Late response finds nobody waiting
        let (_, payload) = published.recv().await.unwrap();
        let request: HistoryRequest = serde_json::from_str(&payload).unwrap();
        assert!(!requester.deliver(request.id, Vec::new()));
    }

    #[tokio::test]
    async fn test_fetch_cancelled() {
        let (requester, _published) = requester(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = requester.fetch(query(), &cancel).await;
        assert!(matches!(result, Err(LiveError::Cancelled)));
        assert_eq!(requester.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_range_rejected() {
        let (requester, _published) = requester(Duration::from_secs(1));
        let bad = HistoryQuery {
            from: 5,
            to: 5,
            ..HistoryQuery::default()
        };
        assert!(requester.fetch(bad, &CancellationToken::new()).await.is_err());
    }
}
