use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Failure talking to a remote instance
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status} response: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl ApiError {
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArgs(message.into())
    }
}
