use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Event kinds relayed to subscribers. Everything else arriving on the
/// platform stream is discarded before any payload parsing.
pub const RELAYED_EVENTS: [&str; 20] = [
    "GUILD_UPDATE",
    "VOICE_STATE_UPDATE",
    "GUILD_MEMBER_ADD",
    "GUILD_MEMBER_UPDATE",
    "GUILD_MEMBER_REMOVE",
    "GUILD_BAN_ADD",
    "GUILD_BAN_REMOVE",
    "CHANNEL_CREATE",
    "CHANNEL_UPDATE",
    "CHANNEL_DELETE",
    "GUILD_ROLE_CREATE",
    "GUILD_ROLE_UPDATE",
    "GUILD_ROLE_DELETE",
    "MESSAGE_CREATE",
    "MESSAGE_UPDATE",
    "MESSAGE_DELETE",
    "MESSAGE_REACTION_ADD",
    "MESSAGE_REACTION_REMOVE",
    "MESSAGE_REACTION_REMOVE_ALL",
    "INTERACTION_CREATE",
];

/// Whether an event kind is on the relay allow-list.
pub fn is_relayed(kind: &str) -> bool {
    RELAYED_EVENTS.contains(&kind)
}

/// One raw event from the platform stream: the dispatch kind plus the
/// undecoded JSON payload. Transient — forwarded or discarded, never stored.
#[derive(Clone, Debug)]
pub struct GatewayEvent {
    pub kind: String,
    pub payload: Bytes,
}

impl GatewayEvent {
    pub fn new(kind: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }
}

/// The normalized wire shape written to subscribers for every relayed event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub name: String,
    pub data: serde_json::Value,
}

/// The one field the router decodes out of an otherwise-opaque payload.
#[derive(Debug, Deserialize)]
struct RoutingKey {
    #[serde(default)]
    guild_id: Option<String>,
}

/// Extract the guild routing key from a parsed event payload.
/// Returns `None` when the payload is not an object, the field is absent,
/// or the field is not a string.
pub fn routing_key(payload: &serde_json::Value) -> Option<crate::ids::GuildId> {
    RoutingKey::deserialize(payload)
        .ok()
        .and_then(|k| k.guild_id)
        .map(crate::ids::GuildId::from_raw)
}
