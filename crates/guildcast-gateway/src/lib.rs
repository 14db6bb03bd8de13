//! Discord gateway session: the push-based platform stream feeding the
//! relay. Connects, identifies, heartbeats, and republishes every dispatch
//! frame as a [`GatewayEvent`] on a broadcast channel. Reconnects with
//! capped exponential backoff until shut down.

pub mod frame;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use guildcast_core::GatewayEvent;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::frame::{
    GatewayFrame, OP_DISPATCH, OP_HEARTBEAT, OP_HEARTBEAT_ACK, OP_HELLO, OP_IDENTIFY,
    OP_INVALID_SESSION, OP_RECONNECT,
};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsWrite = futures::stream::SplitSink<WsStream, Message>;

pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Intents covering every kind on the relay allow-list: guilds, members,
/// moderation, voice states, messages, reactions, message content.
pub const DEFAULT_INTENTS: u64 =
    (1 << 0) | (1 << 1) | (1 << 2) | (1 << 7) | (1 << 9) | (1 << 10) | (1 << 15);

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Gateway session configuration. The bot token stays wrapped until the
/// Identify frame is built.
pub struct GatewayConfig {
    pub url: String,
    pub token: SecretString,
    pub intents: u64,
}

impl GatewayConfig {
    pub fn new(token: SecretString) -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            token,
            intents: DEFAULT_INTENTS,
        }
    }
}

/// Run the gateway session until `shutdown` flips to true. Each dropped or
/// failed session is retried with doubling backoff, reset on success.
pub async fn run_gateway(
    config: GatewayConfig,
    event_tx: broadcast::Sender<GatewayEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Duration::from_secs(1);

    loop {
        if *shutdown.borrow() {
            break;
        }

        match tokio_tungstenite::connect_async(config.url.as_str()).await {
            Ok((stream, _)) => {
                backoff = Duration::from_secs(1);
                if let Err(e) = run_session(stream, &config, &event_tx, &mut shutdown).await {
                    warn!(error = %e, "gateway session ended");
                }
            }
            Err(e) => {
                warn!(error = %e, "gateway connect failed");
            }
        }

        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.changed() => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }

    info!("gateway loop exited");
}

async fn run_session(
    stream: WsStream,
    config: &GatewayConfig,
    event_tx: &broadcast::Sender<GatewayEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), GatewayError> {
    let (write, mut read) = stream.split();
    let write = Arc::new(Mutex::new(write));
    let seq = Arc::new(AtomicU64::new(0));
    let seq_set = Arc::new(AtomicBool::new(false));

    let mut heartbeat_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut identified = false;

    let result = loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break Ok(());
                }
            }
            msg = read.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => break Err(GatewayError::Transport(e.to_string())),
                    None => break Err(GatewayError::Transport("stream closed".into())),
                };

                let text = match msg {
                    Message::Text(text) => text,
                    Message::Close(_) => break Err(GatewayError::Transport("close frame".into())),
                    _ => continue,
                };

                let frame: GatewayFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!(error = %e, "unparseable gateway frame");
                        continue;
                    }
                };

                if let Some(s) = frame.s {
                    seq.store(s, Ordering::Relaxed);
                    seq_set.store(true, Ordering::Relaxed);
                }

                match frame.op {
                    OP_HELLO => {
                        let interval = Duration::from_millis(frame.heartbeat_interval_ms());
                        if heartbeat_task.is_none() {
                            heartbeat_task = Some(spawn_heartbeat_task(
                                write.clone(),
                                seq.clone(),
                                seq_set.clone(),
                                interval,
                            ));
                        }
                        if !identified {
                            if let Err(e) = send_identify(&write, config).await {
                                break Err(e);
                            }
                            identified = true;
                            info!("gateway identified");
                        }
                    }
                    OP_DISPATCH => {
                        if let (Some(kind), Some(data)) = (frame.t, frame.d) {
                            publish_dispatch(event_tx, kind, &data);
                        }
                    }
                    OP_HEARTBEAT => {
                        if let Err(e) = send_heartbeat(&write, current_seq(&seq, &seq_set)).await {
                            break Err(e);
                        }
                    }
                    OP_RECONNECT => {
                        break Err(GatewayError::Protocol("reconnect requested".into()));
                    }
                    OP_INVALID_SESSION => {
                        break Err(GatewayError::Protocol("invalid session".into()));
                    }
                    OP_HEARTBEAT_ACK => {}
                    other => debug!(op = other, "unhandled gateway opcode"),
                }
            }
        }
    };

    if let Some(task) = heartbeat_task.take() {
        task.abort();
    }

    result
}

fn publish_dispatch(
    event_tx: &broadcast::Sender<GatewayEvent>,
    kind: String,
    data: &serde_json::Value,
) {
    match serde_json::to_vec(data) {
        Ok(payload) => {
            // Err only means no live subscriber; the stream keeps flowing.
            let _ = event_tx.send(GatewayEvent::new(kind, payload));
        }
        Err(e) => warn!(error = %e, "dispatch payload re-encode failed"),
    }
}

fn current_seq(seq: &AtomicU64, seq_set: &AtomicBool) -> Option<u64> {
    if seq_set.load(Ordering::Relaxed) {
        Some(seq.load(Ordering::Relaxed))
    } else {
        None
    }
}

fn spawn_heartbeat_task(
    write: Arc<Mutex<WsWrite>>,
    seq: Arc<AtomicU64>,
    seq_set: Arc<AtomicBool>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        // First heartbeat lands at interval * jitter, per the gateway docs.
        tokio::time::sleep(interval.mul_f64(rand::random::<f64>())).await;
        loop {
            let current = current_seq(&seq, &seq_set);
            if send_heartbeat(&write, current).await.is_err() {
                break;
            }
            tokio::time::sleep(interval).await;
        }
    })
}

async fn send_identify(
    write: &Arc<Mutex<WsWrite>>,
    config: &GatewayConfig,
) -> Result<(), GatewayError> {
    let payload = json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": format!("Bot {}", config.token.expose_secret()),
            "intents": config.intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "guildcast",
                "device": "guildcast"
            }
        }
    });
    send_json(write, &payload).await
}

async fn send_heartbeat(
    write: &Arc<Mutex<WsWrite>>,
    seq: Option<u64>,
) -> Result<(), GatewayError> {
    send_json(write, &json!({ "op": OP_HEARTBEAT, "d": seq })).await
}

async fn send_json(
    write: &Arc<Mutex<WsWrite>>,
    payload: &serde_json::Value,
) -> Result<(), GatewayError> {
    let text = serde_json::to_string(payload)
        .map_err(|e| GatewayError::Protocol(e.to_string()))?;
    let mut writer = write.lock().await;
    writer
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))
}
