#![allow(clippy::unwrap_used, clippy::expect_used)]

use api_client::error::ApiError;
use api_client::{BrokerSession, PaperSession};
use async_trait::async_trait;
use chrono::Utc;
use configuration::{Config, DurationPolicy};
use core_types::{Direction, OpenPosition, OrderRequest, PlacedOrder, SystemClock, TradeRecord};
use engine::{ClientEngine, MasterEngine, error::EngineError};
use events::EventLog;
use executor::MirrorExecutor;
use rust_decimal_macros::dec;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fast_config(log_path: &Path) -> Config {
    let mut config = Config::default();
    config.event_log.path = log_path.to_path_buf();
    config.master.poll_interval = Duration::from_millis(10);
    config.master.error_backoff = Duration::from_millis(10);
    config.client.poll_interval = Duration::from_millis(10);
    config.client.duration_policy = DurationPolicy::Seconds;
    config.supervisor.startup_retry_delay = Duration::from_millis(1);
    config.supervisor.reconnect_delay = Duration::from_millis(1);
    config
}

async fn run_for<F>(cancel: CancellationToken, run: F) -> Result<(), EngineError>
where
    F: std::future::Future<Output = Result<(), EngineError>> + Send + 'static,
{
    let handle = tokio::spawn(run);
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    handle.await.unwrap()
}

#[tokio::test]
async fn master_records_new_positions_until_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.log");
    let session = Arc::new(PaperSession::new("master"));
    session.fail_next_connects(2);
    session.open_position(OpenPosition {
        raw_id: "5550001".to_string(),
        asset: "EURUSD".to_string(),
        amount: dec!(3),
        direction: Direction::Put,
        duration_secs: 120,
        opened_at: Utc::now(),
    });

    let cancel = CancellationToken::new();
    let engine = MasterEngine::new(&fast_config(&path), session.clone(), Arc::new(SystemClock));
    run_for(cancel.clone(), engine.run(cancel)).await.unwrap();

    // Two refused connects, then the third attempt sticks.
    assert_eq!(session.connect_attempts(), 3);
    assert!(!session.is_connected().await);

    let records = EventLog::new(&path).read_all().await.unwrap().records;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, 5_550_001);
    assert_eq!(records[0].direction, Direction::Put);
}

#[tokio::test]
async fn client_mirrors_fresh_records_until_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.log");
    let log = EventLog::new(&path);
    let now = Utc::now().timestamp();
    log.append(&TradeRecord::new(now, 11, "EURUSD", dec!(5), Direction::Call, 60).unwrap())
        .await
        .unwrap();
    log.append(&TradeRecord::new(now - 120, 12, "EURUSD", dec!(5), Direction::Call, 60).unwrap())
        .await
        .unwrap();

    let session = Arc::new(PaperSession::new("client"));
    let config = fast_config(&path);
    let executor = Arc::new(MirrorExecutor::new(
        session.clone(),
        config.client.broker.symbols(),
        config.client.duration_policy.clone(),
    ));
    let cancel = CancellationToken::new();
    let engine = ClientEngine::new(&config, session.clone(), executor, Arc::new(SystemClock));
    run_for(cancel.clone(), engine.run(cancel)).await.unwrap();

    let orders = session.placed_orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].trade_id, 11);
    assert_eq!(orders[0].duration_secs, 60);
}

#[tokio::test]
async fn unreachable_broker_fails_cold_start() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(&dir.path().join("orders.log"));
    config.supervisor.startup_attempts = 3;

    let session = Arc::new(PaperSession::new("master"));
    session.fail_next_connects(u32::MAX);
    let engine = MasterEngine::new(&config, session.clone(), Arc::new(SystemClock));

    let err = engine.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionUnavailable { attempts: 3, .. }));
    assert_eq!(session.connect_attempts(), 3);
}

/// A session that reports one open position, then stops answering polls while
/// still looking connected to the loop.
#[derive(Default)]
struct HalfOpenSession {
    polls: AtomicU32,
    pings: AtomicU32,
    connects: AtomicU32,
}

#[async_trait]
impl BrokerSession for HalfOpenSession {
    fn name(&self) -> &str {
        "half-open"
    }

    async fn connect(&self) -> Result<(), ApiError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.pings.fetch_add(1, Ordering::SeqCst);
        false
    }

    async fn list_open_positions(&self) -> Result<Vec<OpenPosition>, ApiError> {
        if self.polls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(vec![OpenPosition {
                raw_id: "1234".to_string(),
                asset: "EURUSD".to_string(),
                amount: dec!(1),
                direction: Direction::Call,
                duration_secs: 60,
                opened_at: Utc::now(),
            }]);
        }
        Err(ApiError::Timeout("portfolio".to_string()))
    }

    async fn place_order(&self, _order: &OrderRequest) -> Result<PlacedOrder, ApiError> {
        Err(ApiError::NotConnected)
    }

    async fn resolve_asset(&self, _symbol: &str) -> Result<Option<String>, ApiError> {
        Ok(None)
    }

    async fn disconnect(&self) {}
}

#[tokio::test]
async fn failing_polls_after_a_busy_cycle_still_get_health_checked() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(&dir.path().join("orders.log"));
    config.master.poll_interval = Duration::from_millis(5);
    config.master.error_backoff = Duration::from_millis(1);
    config.supervisor.health_check_every = 3;

    let session = Arc::new(HalfOpenSession::default());
    let cancel = CancellationToken::new();
    let engine = MasterEngine::new(&config, session.clone(), Arc::new(SystemClock));
    run_for(cancel.clone(), engine.run(cancel)).await.unwrap();

    assert!(session.polls.load(Ordering::SeqCst) > 3);
    assert!(session.pings.load(Ordering::SeqCst) >= 1);
    assert!(session.connects.load(Ordering::SeqCst) >= 2);
}
