//! Inbound client message handling.
//!
//! Every text frame a subscriber sends lands on one mpsc channel as
//! `(ConnectionId, String)`. The consumer is the injection point: `start()`
//! wires up [`log_client_messages`], which records and discards; an
//! embedder building its own router can attach any consumer instead.

use tokio::sync::mpsc;
use tracing::debug;

use guildcast_core::ConnectionId;

/// Default consumer: log each inbound message and drop it.
pub async fn log_client_messages(mut rx: mpsc::Receiver<(ConnectionId, String)>) {
    while let Some((conn_id, message)) = rx.recv().await {
        debug!(conn = %conn_id, len = message.len(), "client message ignored");
    }
}
