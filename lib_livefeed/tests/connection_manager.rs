//! # ConnectionManager lifecycle tests
//!
//! Drive the state machine through a scripted in-memory connector with the
//! Tokio clock paused, so reconnect delays elapse instantly.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use common::{manager, wait_for, ScriptedConnector, Step, RETRY_DELAY};
use lib_livefeed::{ConnectionState, EventKind, LiveEvent, LiveFeedError, MetricsUpdate, METRICS_UPDATE};

#[tokio::test(start_paused = true)]
async fn exhausting_retries_closes_and_stops_opening() {
    let connector = ScriptedConnector::new(&[], Step::Refuse);
    let live = manager(&connector, 5);

    assert!(live.connect());
    wait_for(&live, ConnectionState::Closed).await;

    // One initial attempt plus five retries.
    assert_eq!(connector.opens(), 6);
    assert_eq!(live.attempts(), 5);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.opens(), 6);
    assert_eq!(live.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn successful_connection_resets_the_attempt_budget() {
    let connector = ScriptedConnector::new(&[Step::Refuse, Step::Accept], Step::Refuse);
    let live = manager(&connector, 2);

    live.connect();
    wait_for(&live, ConnectionState::Connected).await;
    assert_eq!(connector.opens(), 2);
    assert_eq!(live.attempts(), 0);

    // Server goes away; the second failure run gets the full budget again.
    drop(connector.take_remote());
    wait_for(&live, ConnectionState::Closed).await;
    assert_eq!(connector.opens(), 4);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_a_pending_reconnect() {
    let connector = ScriptedConnector::new(&[], Step::Refuse);
    let live = manager(&connector, 5);

    live.connect();
    wait_for(&live, ConnectionState::Reconnecting).await;
    assert_eq!(connector.opens(), 1);

    live.disconnect();
    assert_eq!(live.state(), ConnectionState::Closed);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.opens(), 1);
    assert_eq!(live.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn connect_while_active_does_not_open_a_second_transport() {
    let connector = ScriptedConnector::new(&[], Step::Accept);
    let live = manager(&connector, 5);

    assert!(live.connect());
    assert!(!live.connect());
    wait_for(&live, ConnectionState::Connected).await;
    assert!(!live.connect());
    assert_eq!(connector.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn send_only_writes_while_connected() {
    let connector = ScriptedConnector::new(&[Step::Accept], Step::Refuse);
    let live = manager(&connector, 1);

    live.send(&json!({"before": "connect"}));

    live.connect();
    wait_for(&live, ConnectionState::Connected).await;
    let mut remote = connector.take_remote();

    live.send(&json!({"action": "refresh"}));
    assert_eq!(remote.from_client.recv().await.as_deref(), Some(r#"{"action":"refresh"}"#));

    drop(remote.to_client);
    wait_for(&live, ConnectionState::Reconnecting).await;
    live.send(&json!({"during": "reconnect"}));

    // The old session closed its side without writing anything else.
    assert_eq!(remote.from_client.recv().await, None);

    wait_for(&live, ConnectionState::Closed).await;
    live.send(&json!({"after": "close"}));
    live.send_text("raw");
    assert_eq!(connector.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn disconnect_closes_the_open_transport() {
    let connector = ScriptedConnector::new(&[], Step::Accept);
    let live = manager(&connector, 5);

    live.connect();
    wait_for(&live, ConnectionState::Connected).await;
    let mut remote = connector.take_remote();

    live.disconnect();
    live.disconnect();
    assert_eq!(live.state(), ConnectionState::Closed);
    assert_eq!(remote.from_client.recv().await, None);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_explicit_disconnect() {
    let connector = ScriptedConnector::new(&[], Step::Accept);
    let live = manager(&connector, 5);

    live.connect();
    wait_for(&live, ConnectionState::Connected).await;
    let first = connector.take_remote();
    live.disconnect();

    assert!(live.connect());
    wait_for(&live, ConnectionState::Connected).await;
    assert_eq!(connector.opens(), 2);

    // The first transport was released before the second was used.
    assert!(first.drain().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn metrics_update_reaches_handler_exactly_once() {
    let connector = ScriptedConnector::new(&[], Step::Accept);
    let live = manager(&connector, 5);

    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    live.subscribe(METRICS_UPDATE, move |payload| {
        sink.lock().unwrap().push(payload);
        Ok(())
    });

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
    live.subscribe("sentinel", move |_| {
        let _ = done_tx.send(());
        Ok(())
    });

    live.connect();
    wait_for(&live, ConnectionState::Connected).await;
    let remote = connector.take_remote();

    remote.push(r#"{"type":"metricsUpdate","data":{"balance":100}}"#);
    remote.push(r#"{"type":"sentinel"}"#);
    done_rx.recv().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![json!({"balance": 100})]);
}

#[tokio::test(start_paused = true)]
async fn bad_frames_and_failing_handlers_keep_the_connection() {
    let connector = ScriptedConnector::new(&[], Step::Accept);
    let live = manager(&connector, 5);

    let (tx, mut rx) = mpsc::unbounded_channel::<MetricsUpdate>();
    live.subscribe_typed(METRICS_UPDATE, move |update: MetricsUpdate| {
        tx.send(update)?;
        Ok(())
    });
    live.subscribe("boom", |_| panic!("consumer bug"));
    live.subscribe("fails", |_| Err(anyhow::anyhow!("rejected")));

    live.connect();
    wait_for(&live, ConnectionState::Connected).await;
    let remote = connector.take_remote();

    remote.push("definitely not json");
    remote.push(r#"{"type":"#);
    remote.push(r#"{"type":"boom","data":{}}"#);
    remote.push(r#"{"type":"fails","data":{}}"#);
    remote.push(r#"{"type":"unknownEvent","data":{}}"#);
    remote.push(r#"{"type":"metricsUpdate","data":{"balance":"wrong shape"}}"#);
    remote.push(r#"{"type":"metricsUpdate","data":{"balance":42.5,"dailyPnL":1.5}}"#);

    let update = rx.recv().await.unwrap();
    assert_eq!(update.balance, 42.5);
    assert_eq!(update.daily_pnl, Some(1.5));
    assert_eq!(live.state(), ConnectionState::Connected);
    assert_eq!(connector.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_events_are_dropped() {
    let connector = ScriptedConnector::new(&[], Step::Accept);
    let live = manager(&connector, 5);

    let seen = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&seen);
    live.subscribe("x", move |_| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });
    assert!(live.unsubscribe("x"));
    assert!(!live.unsubscribe("x"));

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
    live.subscribe("sentinel", move |_| {
        let _ = done_tx.send(());
        Ok(())
    });

    live.connect();
    wait_for(&live, ConnectionState::Connected).await;
    let remote = connector.take_remote();
    remote.push(r#"{"type":"x","data":1}"#);
    remote.push(r#"{"type":"sentinel"}"#);
    done_rx.recv().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), 0);
    assert_eq!(live.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_manager_tears_down_the_session() {
    let connector = ScriptedConnector::new(&[], Step::Refuse);
    let live = manager(&connector, 5);

    live.connect();
    wait_for(&live, ConnectionState::Reconnecting).await;
    drop(live);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_error_while_connected_reconnects_like_a_close() {
    let connector = ScriptedConnector::new(&[], Step::Accept);
    let live = manager(&connector, 5);

    live.connect();
    wait_for(&live, ConnectionState::Connected).await;
    let mut remote = connector.take_remote();

    let failed_at = tokio::time::Instant::now();
    remote.to_client.send(Err(LiveFeedError::Transport("connection reset".into()))).unwrap();

    wait_for(&live, ConnectionState::Reconnecting).await;
    assert_eq!(connector.opens(), 1);
    assert_eq!(remote.from_client.recv().await, None);

    wait_for(&live, ConnectionState::Connected).await;
    assert!(failed_at.elapsed() >= RETRY_DELAY);
    assert_eq!(connector.opens(), 2);
    assert_eq!(live.attempts(), 0);

    let mut second = connector.take_remote();
    live.send(&json!({"action": "refresh"}));
    assert_eq!(second.from_client.recv().await.as_deref(), Some(r#"{"action":"refresh"}"#));
}

#[tokio::test(start_paused = true)]
async fn stalled_write_does_not_block_the_next_session() {
    let connector = ScriptedConnector::new(&[Step::Stall], Step::Accept);
    let live = manager(&connector, 5);

    live.connect();
    wait_for(&live, ConnectionState::Connected).await;

    // Let the session pick up the write and park on it.
    live.send(&json!({"a": 1}));
    tokio::time::sleep(Duration::from_millis(10)).await;

    live.disconnect();
    assert!(live.connect());
    wait_for(&live, ConnectionState::Connected).await;
    assert_eq!(connector.opens(), 2);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(live.state(), ConnectionState::Connected);
    assert_eq!(connector.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn kind_subscription_receives_typed_metrics() {
    let connector = ScriptedConnector::new(&[], Step::Accept);
    let live = manager(&connector, 5);

    let (tx, mut rx) = mpsc::unbounded_channel::<LiveEvent>();
    live.subscribe_kind(EventKind::MetricsUpdate, move |event| {
        tx.send(event)?;
        Ok(())
    });
    assert!(live.registry().contains(METRICS_UPDATE));

    live.connect();
    wait_for(&live, ConnectionState::Connected).await;
    let remote = connector.take_remote();
    remote.push(r#"{"type":"metricsUpdate","data":{"balance":250,"positions":[{"symbol":"EURUSD"}]}}"#);

    match rx.recv().await.unwrap() {
        LiveEvent::MetricsUpdate(update) => {
            assert_eq!(update.balance, 250.0);
            assert_eq!(update.positions.len(), 1);
            assert_eq!(update.daily_pnl, None);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(live.state(), ConnectionState::Connected);
}
