use crate::error::ApiError;
use async_trait::async_trait;
use core_types::{OpenPosition, OrderRequest, PlacedOrder};

pub mod deriv;
pub mod error;
pub mod factory;
pub mod paper;
pub mod responses;
// --- Public API ---
pub use deriv::DerivSession;
pub use factory::build_session;
pub use paper::PaperSession;

/// The generic, abstract interface for one broker account.
/// The producer and the client-side executor only ever talk to this trait, so
/// the broker behind it (live or paper) can be swapped out.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Short label used in logs, e.g. `"deriv"`.
    fn name(&self) -> &str;

    /// Establishes (or re-establishes) the session, replacing any previous connection.
    async fn connect(&self) -> Result<(), ApiError>;

    /// Probes the broker. Used by the reconnection supervisor's health check.
    async fn is_connected(&self) -> bool;

    /// Fetches every position currently open on the account. (Authenticated)
    async fn list_open_positions(&self) -> Result<Vec<OpenPosition>, ApiError>;

    /// Tells the session a position has been mirrored. Brokers whose position
    /// feed only shows unseen trades use this to drop it from the next poll.
    async fn acknowledge_position(&self, _raw_id: &str) -> Result<(), ApiError> {
        Ok(())
    }

    /// Places a new order on the account. (Authenticated)
    async fn place_order(&self, order: &OrderRequest) -> Result<PlacedOrder, ApiError>;

    /// Looks up a broker-native symbol. Returns `None` when the asset does not
    /// exist or is not tradeable right now.
    async fn resolve_asset(&self, symbol: &str) -> Result<Option<String>, ApiError>;

    async fn disconnect(&self);
}
