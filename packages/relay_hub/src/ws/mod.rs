//! Relay WebSocket transport
//!
//! One task pair per connection: a sender task draining the peer's outbound
//! queue and an input task feeding inbound frames into the hub broadcast.

mod handler;

pub use handler::handle_relay_ws;
