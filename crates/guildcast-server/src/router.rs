//! Event classification and fan-out.
//!
//! A single task subscribes to the platform stream and, per event:
//! allow-list check, payload parse, routing-key extraction, then delivery
//! to every connection bound to the extracted guild. A dropped event is
//! never fatal to the stream, and a failed delivery never evicts a
//! connection — teardown is the lifecycle's job alone.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use guildcast_core::events::{self, Envelope, GatewayEvent};

use crate::client::ConnectionRegistry;

pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
}

impl EventRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Start the dispatch task. Runs until the event channel closes.
    pub fn start(self, mut rx: broadcast::Receiver<GatewayEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => self.dispatch(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event router lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("event channel closed, router stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Classify and deliver one event. Infallible by design: every failure
    /// mode drops the event and reports it.
    pub fn dispatch(&self, event: &GatewayEvent) {
        if !events::is_relayed(&event.kind) {
            return;
        }

        let payload: serde_json::Value = match serde_json::from_slice(&event.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(kind = %event.kind, error = %e, "event payload unparseable, dropped");
                return;
            }
        };

        let Some(guild) = events::routing_key(&payload) else {
            warn!(kind = %event.kind, "event has no guild_id, dropped");
            return;
        };

        let envelope = Envelope {
            name: event.kind.clone(),
            data: payload,
        };
        match serde_json::to_string(&envelope) {
            Ok(json) => {
                let delivered = self.registry.deliver_to_guild(&guild, &json);
                debug!(kind = %event.kind, guild = %guild, delivered, "event dispatched");
            }
            Err(e) => warn!(kind = %event.kind, error = %e, "envelope encode failed"),
        }
    }
}
