use crate::duration::fold_duration;
use crate::error::ExecutionError;
use api_client::BrokerSession;
use async_trait::async_trait;
use configuration::DurationPolicy;
use core_types::{OrderRequest, PlacedOrder, SymbolConvention, TradeRecord};
use std::sync::Arc;

/// A generic trait for an execution engine.
///
/// The client engine hands records to it without knowing which broker, symbol
/// convention or expiry scheme sits behind.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Places the order mirroring `record`. Called at most once per record.
    async fn execute(&self, record: &TradeRecord) -> Result<PlacedOrder, ExecutionError>;
}

/// The executor that sends mirrored orders to a client broker session.
pub struct MirrorExecutor {
    session: Arc<dyn BrokerSession>,
    symbols: SymbolConvention,
    durations: DurationPolicy,
}

impl MirrorExecutor {
    pub fn new(
        session: Arc<dyn BrokerSession>,
        symbols: SymbolConvention,
        durations: DurationPolicy,
    ) -> Self {
        Self {
            session,
            symbols,
            durations,
        }
    }

    /// Builds the broker order for `record`, checking that its asset can be traded.
    async fn plan(&self, record: &TradeRecord) -> Result<OrderRequest, ExecutionError> {
        let native = self.symbols.to_native(&record.asset);
        let asset = self
            .session
            .resolve_asset(&native)
            .await?
            .ok_or_else(|| ExecutionError::AssetNotTradeable(native.clone()))?;

        let (duration_secs, kind) = fold_duration(&self.durations, record.duration)?;

        Ok(OrderRequest {
            trade_id: record.id,
            asset,
            amount: record.amount,
            direction: record.direction,
            duration_secs,
            kind,
        })
    }
}

#[async_trait]
impl Executor for MirrorExecutor {
    async fn execute(&self, record: &TradeRecord) -> Result<PlacedOrder, ExecutionError> {
        let order = self.plan(record).await?;
        tracing::debug!(
            trade_id = record.id,
            asset = %order.asset,
            duration = order.duration_secs,
            kind = ?order.kind,
            "Placing mirrored order"
        );
        Ok(self.session.place_order(&order).await?)
    }
}
