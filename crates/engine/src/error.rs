use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("API client error: {0}")]
    ApiClient(#[from] api_client::error::ApiError),

    #[error("Event log error: {0}")]
    EventLog(#[from] events::EventLogError),

    #[error("Execution error: {0}")]
    Execution(#[from] executor::ExecutionError),

    #[error("Could not establish a session with {broker} after {attempts} attempts: {last_error}")]
    SessionUnavailable {
        broker: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Shutdown requested")]
    Cancelled,
}

impl EngineError {
    /// True when the broker session has to be re-established.
    pub fn is_session_error(&self) -> bool {
        match self {
            EngineError::ApiClient(e) => e.is_session_error(),
            EngineError::SessionUnavailable { .. } => true,
            _ => false,
        }
    }
}
