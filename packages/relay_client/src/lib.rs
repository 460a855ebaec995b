//! Client side of the problem relay.
//!
//! The hub relays opaque text; the envelope in here is the out-of-band
//! agreement between the scraper (producer) and the viewer (consumer). The
//! producer publishes scraped problem HTML, the consumer receives it and
//! reconnects on a fixed interval when the hub is away.

mod client;
mod envelope;
mod error;

pub use client::{Consumer, Producer, ReconnectPolicy};
pub use envelope::{Envelope, PROBLEM_KIND};
pub use error::ClientError;
