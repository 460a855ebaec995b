use thiserror::Error;

/// Errors surfaced to relay client callers.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure, including connection refused when the hub
    /// is not running. Callers are expected to treat this as retryable.
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The relay closed the connection.
    #[error("relay connection closed")]
    Closed,

    /// The peer sent something that does not parse as an envelope.
    #[error("invalid envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}
