//! Connection registry and fan-out broadcast.
//!
//! The registry is the only shared mutable state in the hub. Membership
//! encodes the connection lifecycle: a registered peer is open, a cancelled
//! peer is closing, and a removed peer is closed. Eviction of a stalled peer
//! removes it and cancels its tasks in the same critical section, so a
//! closed connection is never targeted by a later broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Monotonic connection identifier, never reused while the process runs.
pub type ConnectionId = u64;

/// One registered connection: its outbound queue and task cancellation token.
struct Peer {
    tx: mpsc::Sender<Utf8Bytes>,
    cancel: CancellationToken,
}

/// Result of one broadcast: how many peers the payload was queued for and
/// how many stalled peers were evicted instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

/// The broadcast hub. Owns the registry; connections interact with it only
/// through register / broadcast / unregister.
pub struct Hub {
    next_id: AtomicU64,
    peers: RwLock<HashMap<ConnectionId, Peer>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection to the registry and hand back its fresh id.
    /// Registration cannot fail.
    pub async fn register(
        &self,
        tx: mpsc::Sender<Utf8Bytes>,
        cancel: CancellationToken,
    ) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.peers.write().await.insert(id, Peer { tx, cancel });
        debug!(conn_id = id, "connection registered");
        id
    }

    /// Remove a connection and cancel its tasks. Safe to call for an id that
    /// was never registered or was already evicted; returns whether the
    /// connection was still present.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        match self.peers.write().await.remove(&id) {
            Some(peer) => {
                peer.cancel.cancel();
                debug!(conn_id = id, "connection removed");
                true
            }
            None => false,
        }
    }

    /// Forward `payload` to every open connection except `sender`.
    ///
    /// Each target is independent: a peer whose queue is full or whose
    /// receiver is gone is evicted and cancelled, and the loop continues.
    /// Nothing propagates back to the sender. Per-sender ordering holds
    /// because each connection's input task awaits this call before reading
    /// the next frame, and the per-peer queues are FIFO.
    pub async fn broadcast(&self, sender: ConnectionId, payload: Utf8Bytes) -> BroadcastOutcome {
        let targets: Vec<(ConnectionId, mpsc::Sender<Utf8Bytes>)> = {
            let peers = self.peers.read().await;
            peers
                .iter()
                .filter(|(id, _)| **id != sender)
                .map(|(id, peer)| (*id, peer.tx.clone()))
                .collect()
        };

        let mut outcome = BroadcastOutcome::default();
        let mut failed = Vec::new();

        for (id, tx) in targets {
            match tx.try_send(payload.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(conn_id = id, "peer send queue full, evicting stalled peer");
                    outcome.dropped += 1;
                    failed.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(conn_id = id, "peer queue closed mid-broadcast");
                    outcome.dropped += 1;
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut peers = self.peers.write().await;
            for id in failed {
                if let Some(peer) = peers.remove(&id) {
                    peer.cancel.cancel();
                }
            }
        }

        outcome
    }

    /// Number of currently open connections.
    pub async fn connection_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Drop every connection and clear the registry. Process shutdown only;
    /// in-flight queue contents are best-effort.
    pub async fn shutdown(&self) {
        let mut peers = self.peers.write().await;
        for (_, peer) in peers.drain() {
            peer.cancel.cancel();
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(s: &str) -> Utf8Bytes {
        Utf8Bytes::from(s.to_string())
    }

    async fn register_peer(hub: &Hub, capacity: usize) -> (ConnectionId, mpsc::Receiver<Utf8Bytes>, CancellationToken) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let id = hub.register(tx, cancel.clone()).await;
        (id, rx, cancel)
    }

    #[tokio::test]
    async fn broadcast_reaches_all_other_peers() {
        let hub = Hub::new();
        let (a, mut rx_a, _) = register_peer(&hub, 8).await;
        let (_b, mut rx_b, _) = register_peer(&hub, 8).await;
        let (_c, mut rx_c, _) = register_peer(&hub, 8).await;

        let outcome = hub.broadcast(a, payload("hello")).await;
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.dropped, 0);

        assert_eq!(rx_b.recv().await.unwrap().as_str(), "hello");
        assert_eq!(rx_c.recv().await.unwrap().as_str(), "hello");
        // Sender must not receive its own message.
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn ids_are_monotonic_and_not_reused() {
        let hub = Hub::new();
        let (a, _rx_a, _) = register_peer(&hub, 1).await;
        let (b, _rx_b, _) = register_peer(&hub, 1).await;
        assert!(b > a);

        hub.unregister(a).await;
        let (c, _rx_c, _) = register_peer(&hub, 1).await;
        assert!(c > b);
    }

    #[tokio::test]
    async fn unregister_is_a_defensive_noop_for_unknown_ids() {
        let hub = Hub::new();
        assert!(!hub.unregister(42).await);

        let (a, _rx, _) = register_peer(&hub, 1).await;
        assert!(hub.unregister(a).await);
        // Second removal of the same id is also a no-op.
        assert!(!hub.unregister(a).await);
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn broadcast_with_no_peers_delivers_nothing() {
        let hub = Hub::new();
        let (a, _rx, _) = register_peer(&hub, 1).await;
        let outcome = hub.broadcast(a, payload("ping")).await;
        assert_eq!(outcome, BroadcastOutcome::default());
    }

    #[tokio::test]
    async fn per_sender_order_is_preserved() {
        let hub = Hub::new();
        let (a, _rx_a, _) = register_peer(&hub, 64).await;
        let (_b, mut rx_b, _) = register_peer(&hub, 64).await;

        for i in 0..50 {
            hub.broadcast(a, payload(&format!("msg-{}", i))).await;
        }
        for i in 0..50 {
            assert_eq!(rx_b.recv().await.unwrap().as_str(), format!("msg-{}", i));
        }
    }

    #[tokio::test]
    async fn stalled_peer_is_evicted_not_retried() {
        let hub = Hub::new();
        let (a, _rx_a, _) = register_peer(&hub, 8).await;
        // Queue depth of 1 and a receiver that never reads.
        let (_stalled, rx_stalled, cancel_stalled) = register_peer(&hub, 1).await;
        let (_c, mut rx_c, _) = register_peer(&hub, 8).await;

        let first = hub.broadcast(a, payload("one")).await;
        assert_eq!(first.delivered, 2);

        // Second broadcast finds the stalled queue full: the peer is evicted,
        // the healthy peer still gets the message.
        let second = hub.broadcast(a, payload("two")).await;
        assert_eq!(second.delivered, 1);
        assert_eq!(second.dropped, 1);
        assert!(cancel_stalled.is_cancelled());
        assert_eq!(hub.connection_count().await, 2);

        assert_eq!(rx_c.recv().await.unwrap().as_str(), "one");
        assert_eq!(rx_c.recv().await.unwrap().as_str(), "two");

        // No further deliveries are attempted for the evicted peer.
        drop(rx_stalled);
        let third = hub.broadcast(a, payload("three")).await;
        assert_eq!(third.delivered, 1);
        assert_eq!(third.dropped, 0);
    }

    #[tokio::test]
    async fn closed_receiver_is_removed_during_broadcast() {
        let hub = Hub::new();
        let (a, _rx_a, _) = register_peer(&hub, 8).await;
        let (_gone, rx_gone, _) = register_peer(&hub, 8).await;
        drop(rx_gone);

        let outcome = hub.broadcast(a, payload("hello")).await;
        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_and_clears_everything() {
        let hub = Hub::new();
        let (_a, _rx_a, cancel_a) = register_peer(&hub, 1).await;
        let (_b, _rx_b, cancel_b) = register_peer(&hub, 1).await;

        hub.shutdown().await;
        assert_eq!(hub.connection_count().await, 0);
        assert!(cancel_a.is_cancelled());
        assert!(cancel_b.is_cancelled());
    }
}
