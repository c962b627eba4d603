use api_client::error::ApiError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Asset {0} is not available for trading on the client account")]
    AssetNotTradeable(String),

    #[error("No supported expiry for a duration of {0}s")]
    UnsupportedDuration(u32),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Order placement did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Execution cancelled by shutdown")]
    Cancelled,

    #[error("The execution queue is closed")]
    QueueClosed,
}

impl ExecutionError {
    /// Orders that were never sent to the broker are skipped rather than failed.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            ExecutionError::AssetNotTradeable(_) | ExecutionError::UnsupportedDuration(_)
        )
    }
}
