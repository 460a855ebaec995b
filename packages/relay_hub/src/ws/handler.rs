//! Per-connection WebSocket handler.

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hub::{BroadcastOutcome, ConnectionId, Hub};
use crate::metrics::ServerMetrics;

/// Drive one relay connection until it closes, errors, or is cancelled by
/// the hub (stalled-peer eviction or shutdown).
pub async fn handle_relay_ws(
    socket: WebSocket,
    hub: Arc<Hub>,
    metrics: Arc<ServerMetrics>,
    send_queue_len: usize,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Bounded outbound queue: broadcast never blocks on this peer, and a
    // full queue marks the peer as stalled.
    let (tx, mut rx) = mpsc::channel::<Utf8Bytes>(send_queue_len.max(1));
    let cancel = CancellationToken::new();
    let conn_id = hub.register(tx, cancel.clone()).await;

    metrics.connection_opened();
    let total = hub.connection_count().await;
    info!(conn_id, total, "relay client connected");

    // Task to drain the outbound queue into the socket
    let sender_task = async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    };

    // Task to forward inbound frames to all other peers
    let hub_input = hub.clone();
    let metrics_input = metrics.clone();
    let input_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    metrics_input.message_received();
                    let outcome = hub_input.broadcast(conn_id, text).await;
                    record_outcome(&metrics_input, conn_id, outcome);
                }
                Ok(Message::Binary(data)) => {
                    // The reference clients only send text; tolerate a binary
                    // frame by relaying its lossy UTF-8 form instead of
                    // dropping it.
                    metrics_input.message_received();
                    let text = Utf8Bytes::from(String::from_utf8_lossy(&data).into_owned());
                    let outcome = hub_input.broadcast(conn_id, text).await;
                    record_outcome(&metrics_input, conn_id, outcome);
                }
                Ok(Message::Close(_)) => {
                    debug!(conn_id, "client closed connection");
                    break;
                }
                // Ping/pong is answered by axum
                Ok(_) => {}
                // An abrupt reset is handled the same as a graceful close
                Err(e) => {
                    metrics_input.websocket_error();
                    debug!(conn_id, "websocket error: {}", e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!(conn_id, "sender task ended"),
        _ = input_task => debug!(conn_id, "input task ended"),
        _ = cancel.cancelled() => debug!(conn_id, "connection cancelled by hub"),
    }

    // Defensive no-op if the hub already evicted this peer.
    hub.unregister(conn_id).await;
    metrics.connection_closed();
    let total = hub.connection_count().await;
    info!(conn_id, total, "relay client disconnected");
}

fn record_outcome(metrics: &ServerMetrics, conn_id: ConnectionId, outcome: BroadcastOutcome) {
    metrics.message_relayed(outcome.delivered as u64);
    if outcome.dropped > 0 {
        metrics.message_dropped(outcome.dropped as u64);
        warn!(
            conn_id,
            dropped = outcome.dropped,
            "evicted stalled peers during broadcast"
        );
    }
    debug!(conn_id, delivered = outcome.delivered, "relayed message");
}
