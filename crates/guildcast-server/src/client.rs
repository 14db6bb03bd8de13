//! Live connection registry and per-connection lifecycle.
//!
//! The registry is the only shared mutable state in the relay. An entry
//! exists exactly while its connection is open and authenticated: inserted
//! by the upgrade handler, removed unconditionally when the connection's
//! own read/write tasks end. Event fan-out never touches sockets directly;
//! it enqueues onto each connection's bounded send queue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use guildcast_core::{ConnectionId, GuildId};

/// Sent once, as plain text, before the read loop starts. Not an envelope.
pub const GREETING: &str = "You are connected.";

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// One registered subscriber connection.
pub struct Connection {
    pub guild_id: GuildId,
    pub remote: Option<SocketAddr>,
    tx: mpsc::Sender<String>,
}

/// Registry of all live connections, keyed by connection ID.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    max_send_queue: usize,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a freshly authenticated connection. Returns its ID and the
    /// receiving end of its send queue.
    pub fn register(
        &self,
        guild_id: GuildId,
        remote: Option<SocketAddr>,
    ) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.connections.insert(
            id.clone(),
            Connection {
                guild_id,
                remote,
                tx,
            },
        );
        (id, rx)
    }

    /// Remove a connection. Idempotent; returns the removed entry so the
    /// caller can log its guild and remote address.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(id).map(|(_, conn)| conn)
    }

    /// The guild a live connection is bound to, if it is still registered.
    pub fn guild_of(&self, id: &ConnectionId) -> Option<GuildId> {
        self.connections.get(id).map(|c| c.guild_id.clone())
    }

    /// Enqueue a message for every connection bound to the guild. Returns
    /// the number of queues reached. A full queue drops the message for
    /// that connection only; a closed queue means teardown is already in
    /// progress and eviction is left to the connection's own lifecycle.
    pub fn deliver_to_guild(&self, guild: &GuildId, message: &str) -> usize {
        let mut delivered = 0;
        for entry in self.connections.iter() {
            let conn = entry.value();
            if conn.guild_id != *guild {
                continue;
            }
            match conn.tx.try_send(message.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        conn = %entry.key(),
                        guild = %guild,
                        "send queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drop every entry. Closing a send queue makes its writer task send a
    /// Close frame and end, tearing that connection down. Used at process
    /// shutdown.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        self.connections.clear();
        count
    }
}

/// Own one connection from greeting to teardown.
///
/// The greeting is written first; if that fails the connection is closed
/// without ever entering the loops. Otherwise a writer task drains the
/// send queue (plus periodic keep-alive pings) and a reader task forwards
/// inbound text to `on_message`. Whichever ends first stops the other, the
/// socket is closed, and the connection is deregistered exactly once.
pub async fn handle_connection(
    socket: WebSocket,
    conn_id: ConnectionId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ConnectionRegistry>,
    on_message: mpsc::Sender<(ConnectionId, String)>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    if ws_tx.send(WsMessage::Text(GREETING.into())).await.is_err() {
        registry.unregister(&conn_id);
        debug!(conn = %conn_id, "greeting failed, closing");
        return;
    }

    let writer_cid = conn_id.clone();
    let mut writer = tokio::spawn(async move {
        let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
        keepalive.tick().await; // consume the immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                debug!(conn = %writer_cid, "write failed");
                                break;
                            }
                        }
                        None => {
                            // Queue dropped by deregistration: close the peer.
                            let _ = ws_tx.send(WsMessage::Close(None)).await;
                            break;
                        }
                    }
                }
                _ = keepalive.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let reader_cid = conn_id.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(result) = ws_rx.next().await {
            match result {
                Ok(WsMessage::Text(text)) => {
                    let _ = on_message.send((reader_cid.clone(), text.to_string())).await;
                }
                Ok(WsMessage::Close(_)) => {
                    debug!(conn = %reader_cid, "peer closed");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(conn = %reader_cid, error = %e, "read failed");
                    break;
                }
            }
        }
    });

    // Whichever side ends first, stop the other so both socket halves are
    // released and the handle actually closes.
    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    if let Some(conn) = registry.unregister(&conn_id) {
        info!(
            conn = %conn_id,
            guild = %conn.guild_id,
            remote = ?conn.remote,
            "client disconnected"
        );
    }
}
