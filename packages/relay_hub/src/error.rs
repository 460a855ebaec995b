use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced by the relay server lifecycle.
///
/// Per-peer delivery failures are deliberately absent: a peer that cannot
/// accept a write is evicted and the failure shows up only in logs and
/// metrics, never as an error to the sender.
#[derive(Debug, Error)]
pub enum HubError {
    /// The listening port is unavailable. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `start` was invoked while the server is already listening.
    #[error("relay server is already listening on {0}")]
    AlreadyStarted(SocketAddr),
}
