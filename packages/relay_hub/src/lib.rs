//! Broadcast relay between a problem-page scraper and viewer panels.
//!
//! A single shared room: every text frame received from one connection is
//! forwarded verbatim to every other open connection. Payloads are opaque to
//! the hub — the scraper/viewer envelope is an out-of-band agreement that
//! lives in `relay_client`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod ws;

pub use error::HubError;
pub use hub::{BroadcastOutcome, ConnectionId, Hub};
pub use server::{AppState, RelayServer};
