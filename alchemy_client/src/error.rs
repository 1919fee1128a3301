use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlchemyError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("JSON-RPC error {code}: {message}")]
    RpcError { code: i64, message: String },

    #[error("API error: {message}")]
    ApiError { message: String },

    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed")]
    AuthError,

    #[error("Invalid wallet address: {address}")]
    InvalidAddress { address: String },
}

impl AlchemyError {
    /// How the retry loop should treat this error
    pub fn retry_class(&self) -> retry_utils::RetryableError {
        use retry_utils::RetryableError;
        match self {
            AlchemyError::RateLimit => RetryableError::RateLimit,
            AlchemyError::ServerError { .. } => RetryableError::ServerError,
            AlchemyError::HttpError(e) if e.is_timeout() || e.is_connect() => RetryableError::Timeout,
            // -32005 / 429 are Alchemy's throughput-exceeded codes inside a 200 response
            AlchemyError::RpcError { code, .. } if *code == 429 || *code == -32005 => {
                RetryableError::RateLimit
            }
            _ => RetryableError::Other,
        }
    }
}
