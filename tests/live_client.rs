//! Live Client Integration Tests
//!
//! Drives the live core against an in-process stand-in for the controller:
//! commands are published into a channel, a controller task answers history
//! requests from a recorded trace, and sensor readings are replayed into the
//! feed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gesha_analysis::live::{
    pump, CommandPublisher, HistoryQuery, HistoryRequest, HistoryRequester, HistoryResponse, HistoryRow, LiveError,
    LiveFeed, MachineMode, RemoteCommand, ReplaySource, SensorKind, TempCondition,
};
use gesha_analysis::simulation::{generate_trace, HeatPulse, TraceConfig};
use gesha_analysis::types::Measurement;

/// Publishes into a channel read by the fake controller.
struct BrokerStub {
    tx: mpsc::UnboundedSender<(String, String)>,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl CommandPublisher for BrokerStub {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), LiveError> {
        self.log.lock().unwrap().push(topic.to_string());
        self.tx
            .send((topic.to_string(), payload))
            .map_err(|e| LiveError::Transport(e.to_string()))
    }
}

fn recorded_trace() -> Vec<Measurement> {
    generate_trace(&TraceConfig {
        period_ms: 1_000,
        duration_ms: 5 * 60 * 1000,
        start_time: 0,
        initial_boiler_c: 85.0,
        initial_grouphead_c: 75.0,
        pulses: HeatPulse::evenly_spaced(2, 20_000, 120_000, 15_000, 1.0),
        ..TraceConfig::default()
    })
    .expect("trace")
}

/// Answer `expected` history commands from `trace`, ignoring other topics.
fn spawn_controller(
    requester: Arc<HistoryRequester<BrokerStub>>,
    mut rx: mpsc::UnboundedReceiver<(String, String)>,
    trace: Vec<Measurement>,
    expected: usize,
) -> tokio::task::JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut answered = 0;
        let mut ignored = Vec::new();
        while answered < expected {
            let Some((topic, payload)) = rx.recv().await else {
                break;
            };
            if !topic.ends_with("/temperature/history/command") {
                ignored.push(payload);
                continue;
            }
            let request: HistoryRequest = serde_json::from_str(&payload).expect("request json");
            let limit = request.limit.map_or(usize::MAX, |l| l as usize);
            let rows: Vec<HistoryRow> = trace
                .iter()
                .filter(|m| m.time >= request.from && m.time < request.to)
                .take(limit)
                .map(|m| HistoryRow {
                    time: m.time,
                    boiler_temp_c: m.boiler_temp_c,
                    grouphead_temp_c: m.grouphead_temp_c,
                    heat_level: m.heat_level,
                })
                .collect();
            let response = HistoryResponse { id: request.id, rows };
            let json = serde_json::to_string(&response).expect("response json");
            if requester.handle_response(&json).expect("decode") {
                answered += 1;
            }
        }
        ignored
    })
}

#[tokio::test]
async fn concurrent_history_requests_get_their_own_rows() {
    let (tx, rx) = mpsc::unbounded_channel();
    let log = Arc::new(Mutex::new(Vec::new()));
    let requester = Arc::new(HistoryRequester::new(
        BrokerStub { tx, log: Arc::clone(&log) },
        "gesha",
        Duration::from_secs(5),
    ));
    let controller = spawn_controller(Arc::clone(&requester), rx, recorded_trace(), 2);
    let cancel = CancellationToken::new();

    let early = HistoryQuery {
        from: 0,
        to: 60_000,
        limit: None,
        bucket_size: None,
    };
    let late = HistoryQuery {
        from: 200_000,
        to: 300_000,
        limit: Some(10),
        bucket_size: None,
    };
    let (a, b) = tokio::join!(requester.fetch(early, &cancel), requester.fetch(late, &cancel));
    let (a, b) = (a.expect("early rows"), b.expect("late rows"));

    assert_eq!(a.len(), 60);
    assert!(a.iter().all(|m| m.time < 60_000));
    assert_eq!(b.len(), 10);
    assert_eq!(b[0].time, 200_000);
    assert_eq!(requester.pending_count(), 0);
    assert_eq!(log.lock().unwrap().len(), 2);
    controller.await.expect("controller task");
}

#[tokio::test]
async fn commands_share_the_broker_with_history_traffic() {
    let (tx, rx) = mpsc::unbounded_channel();
    let log = Arc::new(Mutex::new(Vec::new()));
    let requester = Arc::new(HistoryRequester::new(
        BrokerStub { tx: tx.clone(), log: Arc::clone(&log) },
        "gesha",
        Duration::from_secs(5),
    ));
    let controller = spawn_controller(Arc::clone(&requester), rx, recorded_trace(), 1);
    let broker = BrokerStub { tx, log: Arc::clone(&log) };

    RemoteCommand::SetMode(MachineMode::Brew)
        .send(&broker, "gesha")
        .await
        .expect("publish mode");
    RemoteCommand::SetTargetTemperature(93)
        .send(&broker, "gesha")
        .await
        .expect("publish target");
    let rows = requester
        .fetch(
            HistoryQuery {
                from: 0,
                to: 5_000,
                ..HistoryQuery::default()
            },
            &CancellationToken::new(),
        )
        .await
        .expect("history");

    assert_eq!(rows.len(), 5);
    assert_eq!(controller.await.expect("controller task"), vec!["brew".to_string(), "93".to_string()]);
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[
            "gesha/mode/set".to_string(),
            "gesha/temperature/target/set".to_string(),
            "gesha/temperature/history/command".to_string(),
        ]
    );
}

#[tokio::test]
async fn replayed_trace_satisfies_temperature_waits() {
    let trace = recorded_trace();
    let peak = trace.iter().map(|m| m.boiler_temp_c).fold(f64::NEG_INFINITY, f64::max);
    let cancel = CancellationToken::new();
    let feed = LiveFeed::spawn(1_000, cancel.clone());

    let waiter = feed.wait_for_temp(
        SensorKind::Boiler,
        TempCondition::AtLeast(peak - 0.5),
        Duration::from_secs(10),
        &cancel,
    );
    let mut source = ReplaySource::new(trace.clone(), Duration::from_millis(1));
    let sender = feed.sender();
    let (reading, forwarded) = tokio::join!(waiter, pump(&mut source, &sender, &cancel));

    let reading = reading.expect("boiler reached its peak");
    assert!(reading.value >= peak - 0.5);
    assert_eq!(forwarded.expect("pump"), 2 * trace.len() as u64);

    let grouphead = feed.history(SensorKind::Grouphead).await.expect("history");
    assert_eq!(grouphead.len(), trace.len());
    assert!(feed.snapshot().latest(SensorKind::Thermofilter).is_none());
}

#[test]
fn wait_without_readings_times_out() {
    tokio_test::block_on(async {
        let feed = LiveFeed::spawn(10, CancellationToken::new());
        let result = feed
            .wait_for_temp(
                SensorKind::Grouphead,
                TempCondition::AtMost(60.0),
                Duration::from_millis(20),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(LiveError::Timeout(_))));
    });
}
