//! Producer and consumer connections to the relay hub.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::envelope::Envelope;
use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Scraper-side connection: publish scraped pages, then close.
pub struct Producer {
    ws: WsStream,
}

impl Producer {
    /// Connect to the hub. A refused connection is an ordinary error the
    /// caller may retry or report; it must never take the host down.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws, _) = connect_async(url).await?;
        Ok(Self { ws })
    }

    /// Send one opaque text message.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), ClientError> {
        self.ws.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Send an envelope in its serialized form.
    pub async fn publish(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        self.send_text(envelope.to_json()?).await
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws.close(None).await?;
        Ok(())
    }
}

/// How the consumer behaves when the hub is unreachable or drops it.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    pub retry_interval: Duration,
}

impl ReconnectPolicy {
    pub fn fixed(retry_interval: Duration) -> Self {
        Self { retry_interval }
    }
}

impl Default for ReconnectPolicy {
    /// The reference viewer retried every 5 seconds.
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

/// Viewer-side connection: receive relayed messages for as long as the
/// application holds the receiving end.
pub struct Consumer {
    url: String,
    policy: ReconnectPolicy,
}

impl Consumer {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_policy(url, ReconnectPolicy::default())
    }

    pub fn with_policy(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            url: url.into(),
            policy,
        }
    }

    /// Connect and forward every received text message into `tx`. Disconnects
    /// and refused connections are never fatal: the loop sleeps the retry
    /// interval and dials again. Returns once the receiving side of `tx`
    /// is dropped.
    pub async fn run(self, tx: mpsc::Sender<String>) {
        loop {
            match connect_async(self.url.as_str()).await {
                Ok((mut ws, _)) => {
                    info!("connected to relay at {}", self.url);
                    while let Some(msg) = ws.next().await {
                        match msg {
                            Ok(Message::Text(text)) => {
                                if tx.send(text).await.is_err() {
                                    return;
                                }
                            }
                            Ok(Message::Close(_)) => {
                                debug!("relay closed the connection");
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                debug!("websocket error: {}", e);
                                break;
                            }
                        }
                    }
                    warn!(
                        "disconnected from relay, retrying in {:?}",
                        self.policy.retry_interval
                    );
                }
                Err(e) => {
                    debug!(
                        "relay unavailable ({}), retrying in {:?}",
                        e, self.policy.retry_interval
                    );
                }
            }

            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(self.policy.retry_interval).await;
        }
    }
}
