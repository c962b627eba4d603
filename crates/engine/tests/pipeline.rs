#![allow(clippy::unwrap_used, clippy::expect_used)]

use api_client::{BrokerSession, PaperSession};
use chrono::{TimeZone, Utc};
use configuration::{Config, DurationPolicy, LateTradePolicy};
use core_types::{Direction, ManualClock, OpenPosition, SymbolConvention, TradeRecord};
use engine::{Dispatcher, Producer};
use events::{EventLog, LogCursor};
use executor::{ExecutionOutcome, ExecutionPool, MirrorExecutor, PoolSettings};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

const T0: i64 = 1_714_564_800;
const WINDOW: Duration = Duration::from_secs(15);

fn position(raw_id: &str, asset: &str, opened_at: i64) -> OpenPosition {
    OpenPosition {
        raw_id: raw_id.to_string(),
        asset: asset.to_string(),
        amount: dec!(10),
        direction: Direction::Call,
        duration_secs: 60,
        opened_at: Utc.timestamp_opt(opened_at, 0).unwrap(),
    }
}

async fn connected_paper(name: &str) -> Arc<PaperSession> {
    let session = Arc::new(PaperSession::new(name));
    session.connect().await.unwrap();
    session
}

fn producer(
    session: Arc<PaperSession>,
    log: &EventLog,
    clock: Arc<ManualClock>,
    policy: LateTradePolicy,
) -> Producer {
    Producer::new(session, log.clone(), clock, WINDOW, policy, SymbolConvention::DashOtc)
}

#[tokio::test]
async fn producer_records_each_position_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = EventLog::new(dir.path().join("orders.log"));
    let clock = Arc::new(ManualClock::at_unix(T0));
    let session = connected_paper("master").await;
    let mut producer = producer(session.clone(), &log, clock.clone(), LateTradePolicy::Discard);

    session.open_position(position("287334156731", "EURUSD-OTC", T0 - 2));
    let summary = producer.poll_once().await.unwrap();
    assert_eq!(summary.recorded, 1);
    assert_eq!(session.acknowledged(), vec!["287334156731".to_string()]);

    // The broker reports the same trade again.
    session.open_position(position("287334156731", "EURUSD-OTC", T0 - 2));
    clock.advance(Duration::from_millis(500));
    let summary = producer.poll_once().await.unwrap();
    assert_eq!(summary.observed, 1);
    assert_eq!(summary.recorded, 0);

    let batch = log.read_all().await.unwrap();
    assert_eq!(batch.records.len(), 1);
    let record = &batch.records[0];
    assert_eq!(record.id, 34_156_731);
    assert_eq!(record.asset, "EURUSD_otc");
    assert_eq!(record.stamp, T0);
    assert_eq!(record.duration, 60);
}

#[tokio::test]
async fn producer_discards_positions_older_than_window() {
    let dir = tempfile::tempdir().unwrap();
    let log = EventLog::new(dir.path().join("orders.log"));
    let clock = Arc::new(ManualClock::at_unix(T0));
    let session = connected_paper("master").await;
    let mut producer = producer(session.clone(), &log, clock, LateTradePolicy::Discard);

    session.open_position(position("1001", "EURUSD", T0 - 15));
    session.open_position(position("1002", "EURUSD", T0 - 14));
    let summary = producer.poll_once().await.unwrap();
    assert_eq!(summary.stale, 1);
    assert_eq!(summary.recorded, 1);
    // The stale ID is remembered and never reconsidered.
    assert!(producer.dedup().contains(1001));

    let ids: Vec<_> = log.read_all().await.unwrap().records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1002]);
}

#[tokio::test]
async fn producer_can_record_late_trades() {
    let dir = tempfile::tempdir().unwrap();
    let log = EventLog::new(dir.path().join("orders.log"));
    let clock = Arc::new(ManualClock::at_unix(T0));
    let session = connected_paper("master").await;
    let mut producer = producer(session.clone(), &log, clock, LateTradePolicy::Record);

    session.open_position(position("1001", "EURUSD", T0 - 60));
    let summary = producer.poll_once().await.unwrap();
    assert_eq!(summary.late, 1);
    assert_eq!(summary.recorded, 1);

    let record = log.read_all().await.unwrap().records.remove(0);
    assert_eq!(record.stamp, T0);
}

#[tokio::test]
async fn producer_query_failure_marks_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let log = EventLog::new(dir.path().join("orders.log"));
    let clock = Arc::new(ManualClock::at_unix(T0));
    let session = connected_paper("master").await;
    let mut producer = producer(session.clone(), &log, clock, LateTradePolicy::Discard);

    session.open_position(position("77", "EURUSD", T0));
    session.drop_connection();
    let err = producer.poll_once().await.unwrap_err();
    assert!(err.is_session_error());
    assert!(producer.dedup().is_empty());

    session.connect().await.unwrap();
    assert_eq!(producer.poll_once().await.unwrap().recorded, 1);
}

#[tokio::test]
async fn producer_skips_ids_without_digits() {
    let dir = tempfile::tempdir().unwrap();
    let log = EventLog::new(dir.path().join("orders.log"));
    let clock = Arc::new(ManualClock::at_unix(T0));
    let session = connected_paper("master").await;
    let mut producer = producer(session.clone(), &log, clock, LateTradePolicy::Discard);

    session.open_position(position("abc-def", "EURUSD", T0));
    let summary = producer.poll_once().await.unwrap();
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.recorded, 0);
}

#[tokio::test]
async fn record_is_dispatched_once_inside_the_window() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.log");
    let log = EventLog::new(&path);
    let clock = Arc::new(ManualClock::at_unix(T0));
    let mut dispatcher = Dispatcher::new(LogCursor::new(&path), clock.clone(), WINDOW);

    let record = TradeRecord::new(T0, 42, "EURUSD_otc", dec!(10), Direction::Call, 60).unwrap();
    log.append(&record).await.unwrap();

    clock.set_unix(T0 + 3);
    let (admitted, summary) = dispatcher.admit().await.unwrap();
    assert_eq!(admitted, vec![record.clone()]);
    assert_eq!(summary.admitted, 1);
    assert!(dispatcher.dedup().contains(42));

    // The same record shows up again (re-logged by a restarted master).
    log.append(&record).await.unwrap();
    clock.set_unix(T0 + 5);
    let (admitted, summary) = dispatcher.admit().await.unwrap();
    assert!(admitted.is_empty());
    assert_eq!(summary.duplicate, 1);
}

#[tokio::test]
async fn stale_records_are_never_dispatched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.log");
    let log = EventLog::new(&path);
    let clock = Arc::new(ManualClock::at_unix(T0 + 15));
    let mut dispatcher = Dispatcher::new(LogCursor::new(&path), clock.clone(), WINDOW);

    log.append(&TradeRecord::new(T0, 1, "EURUSD", dec!(1), Direction::Put, 60).unwrap())
        .await
        .unwrap();
    log.append(&TradeRecord::new(T0 + 1, 2, "EURUSD", dec!(1), Direction::Put, 60).unwrap())
        .await
        .unwrap();

    let (admitted, summary) = dispatcher.admit().await.unwrap();
    assert_eq!(admitted.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
    assert_eq!(summary.stale, 1);
    assert!(!dispatcher.dedup().contains(1));
}

#[tokio::test]
async fn malformed_lines_do_not_stop_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.log");
    let mut file = tokio::fs::File::create(&path).await.unwrap();
    file.write_all(
        format!(
            "not a trade\n\
             - Time: now Stamp: {T0} ID: 5 Asset: EURUSD Amount: 2 Direction: put Duration: 60\n\
             Stamp: {T0} ID: 6 Asset: EURUSD Amount: -2 Direction: put Duration: 60\n\
             Stamp: {T0} ID: 8 Asset: EURUSD Amount: 2 Direction: sideways Duration: 60\n\
             Stamp: {T0} ID: 7 Asset: GBPUSD Amount: 2.5 Direction: CALL Duration: 120.0\n"
        )
        .as_bytes(),
    )
    .await
    .unwrap();
    drop(file);

    let clock = Arc::new(ManualClock::at_unix(T0 + 1));
    let mut dispatcher = Dispatcher::new(LogCursor::new(&path), clock, WINDOW);
    let (admitted, summary) = dispatcher.admit().await.unwrap();
    assert_eq!(admitted.iter().map(|r| r.id).collect::<Vec<_>>(), vec![5, 8, 7]);
    assert_eq!(admitted[1].direction, Direction::Put);
    assert_eq!(summary.malformed, 2);
}

#[tokio::test]
async fn master_to_client_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.log");
    let clock = Arc::new(ManualClock::at_unix(T0));

    let master = connected_paper("master").await;
    let mut producer = producer(
        master.clone(),
        &EventLog::new(&path),
        clock.clone(),
        LateTradePolicy::Discard,
    );

    let client = Arc::new(PaperSession::new("client").with_tradeable_assets(["EURUSD-OTC"]));
    client.connect().await.unwrap();
    let executor = Arc::new(MirrorExecutor::new(
        client.clone(),
        SymbolConvention::DashOtc,
        DurationPolicy::MinuteBuckets {
            buckets: vec![5, 15],
            blitz_max_secs: 300,
        },
    ));
    let (pool, mut reports) = ExecutionPool::spawn(
        executor,
        PoolSettings {
            workers: 2,
            queue_capacity: 4,
            timeout: Duration::from_secs(5),
        },
        CancellationToken::new(),
    );
    let mut dispatcher = Dispatcher::new(LogCursor::new(&path), clock.clone(), WINDOW);

    master.open_position(position("900000042", "EURUSD-OTC", T0));
    producer.poll_once().await.unwrap();

    clock.set_unix(T0 + 3);
    assert_eq!(dispatcher.dispatch_cycle(&pool).await.unwrap().admitted, 1);
    clock.set_unix(T0 + 5);
    assert_eq!(dispatcher.dispatch_cycle(&pool).await.unwrap().admitted, 0);

    let report = reports.recv().await.unwrap();
    assert_eq!(report.trade_id, 42);
    assert!(matches!(report.outcome, ExecutionOutcome::Placed { .. }));
    pool.shutdown().await;

    let orders = client.placed_orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].asset, "EURUSD-OTC");
    assert_eq!(orders[0].amount, dec!(10));
}

#[test]
fn default_config_matches_pipeline_constants() {
    let config = Config::default();
    assert_eq!(config.admission.window, WINDOW);
    assert_eq!(config.supervisor.health_check_every, 30);
}

#[tokio::test]
async fn closed_queue_fails_the_cycle_and_keeps_ids_admitted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.log");
    let log = EventLog::new(&path);
    for id in [1, 2] {
        log.append(&TradeRecord::new(T0, id, "EURUSD", dec!(1), Direction::Call, 60).unwrap())
            .await
            .unwrap();
    }

    let client = connected_paper("client").await;
    let executor = Arc::new(MirrorExecutor::new(
        client.clone(),
        SymbolConvention::Canonical,
        DurationPolicy::Seconds,
    ));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let (pool, _reports) = ExecutionPool::spawn(
        executor,
        PoolSettings {
            workers: 1,
            queue_capacity: 1,
            timeout: Duration::from_secs(5),
        },
        cancel,
    );
    // Let the worker see the cancellation and release the queue.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let clock = Arc::new(ManualClock::at_unix(T0 + 1));
    let mut dispatcher = Dispatcher::new(LogCursor::new(&path), clock, WINDOW);
    let err = dispatcher.dispatch_cycle(&pool).await.unwrap_err();
    assert!(matches!(
        err,
        engine::error::EngineError::Execution(executor::ExecutionError::QueueClosed)
    ));
    assert!(dispatcher.dedup().contains(1));
    assert!(dispatcher.dedup().contains(2));
    assert!(client.placed_orders().is_empty());
}
