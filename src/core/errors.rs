use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The exchange answered but reported the request as failed
    #[error("API error: {code} - {message}")]
    ApiError { code: String, message: String },

    #[error("Authentication error: {0}")]
    AuthError(String),

    /// Rejected locally before anything was sent
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    /// Retries ran out without a definitive answer; the final state is unknown
    #[error("Gave up after {attempts} attempts, outcome unknown")]
    RetryExhausted { attempts: u32 },
}

impl ExchangeError {
    /// True when the exchange itself rejected the request (HTTP round-trip succeeded)
    pub fn is_application_failure(&self) -> bool {
        matches!(self, Self::ApiError { .. })
    }

    /// True for failures below the exchange protocol: connect, timeout, socket errors
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::HttpError(_)
                | Self::NetworkError(_)
                | Self::ConnectionTimeout(_)
                | Self::WebSocketError(_)
        )
    }
}
