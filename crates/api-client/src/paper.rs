use crate::BrokerSession;
use crate::error::ApiError;
use async_trait::async_trait;
use configuration::PaperSettings;
use core_types::{OpenPosition, OrderRequest, PlacedOrder};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// An in-memory broker account.
///
/// Used for dry runs (every order is accepted and only logged) and as the
/// scriptable broker in tests: connects can be made to fail, the connection can
/// be dropped, orders can be slowed down or rejected.
#[derive(Debug)]
pub struct PaperSession {
    name: String,
    order_latency: Duration,
    state: Mutex<PaperState>,
}

#[derive(Debug, Default)]
struct PaperState {
    connected: bool,
    connect_attempts: u32,
    failing_connects: u32,
    reject_orders: bool,
    tradeable: Option<HashSet<String>>,
    positions: Vec<OpenPosition>,
    acknowledged: Vec<String>,
    orders: Vec<OrderRequest>,
    next_order_id: u64,
}

impl PaperSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order_latency: Duration::ZERO,
            state: Mutex::new(PaperState {
                next_order_id: 1,
                ..PaperState::default()
            }),
        }
    }

    pub fn from_settings(settings: &PaperSettings) -> Self {
        let mut session = Self::new("paper").with_order_latency(settings.order_latency);
        if let Some(assets) = &settings.tradeable_assets {
            session = session.with_tradeable_assets(assets.iter().cloned());
        }
        session
    }

    pub fn with_order_latency(mut self, latency: Duration) -> Self {
        self.order_latency = latency;
        self
    }

    /// Restricts `resolve_asset` to the given native symbols.
    pub fn with_tradeable_assets<I, S>(self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().tradeable = Some(assets.into_iter().map(Into::into).collect());
        self
    }

    /// The next `n` calls to `connect` fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().failing_connects = n;
    }

    /// Simulates the broker closing the connection.
    pub fn drop_connection(&self) {
        self.lock().connected = false;
    }

    pub fn reject_orders(&self, reject: bool) {
        self.lock().reject_orders = reject;
    }

    pub fn open_position(&self, position: OpenPosition) {
        self.lock().positions.push(position);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.lock().orders.clone()
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.lock().acknowledged.clone()
    }

    fn lock(&self) -> MutexGuard<'_, PaperState> {
        // A poisoned lock only means a test panicked while holding it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BrokerSession for PaperSession {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.connect_attempts += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            state.connected = false;
            return Err(ApiError::Connection("paper connect refused".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn list_open_positions(&self) -> Result<Vec<OpenPosition>, ApiError> {
        let state = self.lock();
        if !state.connected {
            return Err(ApiError::NotConnected);
        }
        Ok(state.positions.clone())
    }

    async fn acknowledge_position(&self, raw_id: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.positions.retain(|p| p.raw_id != raw_id);
        state.acknowledged.push(raw_id.to_string());
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<PlacedOrder, ApiError> {
        if !self.order_latency.is_zero() {
            tokio::time::sleep(self.order_latency).await;
        }
        let mut state = self.lock();
        if !state.connected {
            return Err(ApiError::NotConnected);
        }
        if state.reject_orders {
            return Err(ApiError::Broker {
                code: "OrderRejected".to_string(),
                message: format!("paper account rejected order for {}", order.asset),
            });
        }
        let order_id = format!("paper-{}", state.next_order_id);
        state.next_order_id += 1;
        state.orders.push(order.clone());
        tracing::info!(
            order_id = %order_id,
            trade_id = order.trade_id,
            asset = %order.asset,
            amount = %order.amount,
            direction = %order.direction,
            duration = order.duration_secs,
            "Paper order filled"
        );
        Ok(PlacedOrder { order_id })
    }

    async fn resolve_asset(&self, symbol: &str) -> Result<Option<String>, ApiError> {
        let state = self.lock();
        if !state.connected {
            return Err(ApiError::NotConnected);
        }
        let found = match &state.tradeable {
            Some(assets) => assets.contains(symbol),
            None => true,
        };
        Ok(found.then(|| symbol.to_string()))
    }

    async fn disconnect(&self) {
        self.lock().connected = false;
    }
}
