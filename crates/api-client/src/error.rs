use configuration::error::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to connect to the broker: {0}")]
    Connection(String),

    #[error("The broker rejected the credentials: {0}")]
    Authorization(String),

    #[error("The session is not connected")]
    NotConnected,

    #[error("No response to '{0}' within the request timeout")]
    Timeout(String),

    #[error("The broker returned an error ({code}): {message}")]
    Broker { code: String, message: String },

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from API: {0}")]
    InvalidData(String),

    #[error("Session configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl ApiError {
    /// True when the error means the session itself is unusable and the
    /// supervisor should reconnect, as opposed to a single failed request.
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            ApiError::Connection(_) | ApiError::Authorization(_) | ApiError::NotConnected
        )
    }
}
