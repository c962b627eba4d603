use crate::enums::{ContractKind, Direction};
use crate::error::CoreError;
use crate::normalize::is_valid_asset_token;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The dedup key of a mirrored trade.
pub type TradeId = u64;

/// A detected trade as it is recorded in the event log.
///
/// This is the unit of mirrored work: the producer creates one per newly opened
/// master position and every consumer turns it into at most one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Unix time in seconds at which the producer detected the trade.
    pub stamp: i64,
    pub id: TradeId,
    /// Canonical asset symbol.
    pub asset: String,
    /// Stake of the original trade.
    pub amount: Decimal,
    pub direction: Direction,
    /// Contract duration in whole seconds.
    pub duration: u32,
}

impl TradeRecord {
    pub fn new(
        stamp: i64,
        id: TradeId,
        asset: impl Into<String>,
        amount: Decimal,
        direction: Direction,
        duration: u32,
    ) -> Result<Self, CoreError> {
        let asset = asset.into();
        if stamp < 0 {
            return Err(CoreError::InvalidInput("stamp".to_string(), stamp.to_string()));
        }
        if !is_valid_asset_token(&asset) {
            return Err(CoreError::InvalidInput("asset".to_string(), asset));
        }
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidInput("amount".to_string(), amount.to_string()));
        }
        if duration == 0 {
            return Err(CoreError::InvalidInput("duration".to_string(), "0".to_string()));
        }
        Ok(Self {
            stamp,
            id,
            asset,
            amount,
            direction,
            duration,
        })
    }

    /// Milliseconds elapsed between the record's stamp and `now`.
    pub fn age_millis(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.stamp.saturating_mul(1000)
    }

    /// True while the record is younger than the admission `window`.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        within_window(self.age_millis(now), window)
    }
}

/// A position currently open on a broker account, as reported by its session.
///
/// Fields are broker-native: `raw_id` is the broker's own identifier and `asset`
/// uses the session's symbol convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPosition {
    pub raw_id: String,
    pub asset: String,
    pub amount: Decimal,
    pub direction: Direction,
    pub duration_secs: u32,
    pub opened_at: DateTime<Utc>,
}

impl OpenPosition {
    pub fn age_millis(&self, now: DateTime<Utc>) -> i64 {
        (now - self.opened_at).num_milliseconds()
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        within_window(self.age_millis(now), window)
    }
}

/// An order ready to be sent to a client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    /// The trade this order mirrors.
    pub trade_id: TradeId,
    /// Broker-native symbol, already resolved.
    pub asset: String,
    pub amount: Decimal,
    pub direction: Direction,
    pub duration_secs: u32,
    pub kind: ContractKind,
}

/// Broker acknowledgement of a placed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order_id: String,
}

fn within_window(age_millis: i64, window: Duration) -> bool {
    let window_millis = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    age_millis < window_millis
}
