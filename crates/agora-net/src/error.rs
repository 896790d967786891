use thiserror::Error;

/// Errors crossing the remote HTTP API boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status: {0}")]
    Status(u16),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Errors crossing the push relay boundary.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("already subscribed to topic {0}")]
    AlreadySubscribed(String),
}
