use serde::Deserialize;
use serde_json::Value;

pub const OP_DISPATCH: u64 = 0;
pub const OP_HEARTBEAT: u64 = 1;
pub const OP_IDENTIFY: u64 = 2;
pub const OP_RECONNECT: u64 = 7;
pub const OP_INVALID_SESSION: u64 = 9;
pub const OP_HELLO: u64 = 10;
pub const OP_HEARTBEAT_ACK: u64 = 11;

/// One gateway frame: opcode, optional data, sequence number, dispatch kind.
#[derive(Debug, Deserialize)]
pub struct GatewayFrame {
    pub op: u64,
    #[serde(default)]
    pub d: Option<Value>,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

impl GatewayFrame {
    /// Heartbeat interval advertised in a Hello frame, with the documented
    /// 45s fallback.
    pub fn heartbeat_interval_ms(&self) -> u64 {
        self.d
            .as_ref()
            .and_then(|d| d.get("heartbeat_interval"))
            .and_then(|v| v.as_u64())
            .unwrap_or(45_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hello_frame() {
        let frame: GatewayFrame =
            serde_json::from_str(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#).unwrap();
        assert_eq!(frame.op, OP_HELLO);
        assert_eq!(frame.heartbeat_interval_ms(), 41_250);
        assert!(frame.t.is_none());
    }

    #[test]
    fn hello_without_interval_falls_back() {
        let frame: GatewayFrame = serde_json::from_str(r#"{"op":10,"d":{}}"#).unwrap();
        assert_eq!(frame.heartbeat_interval_ms(), 45_000);
    }

    #[test]
    fn parse_dispatch_frame() {
        let raw = r#"{"op":0,"s":42,"t":"MESSAGE_CREATE","d":{"guild_id":"guild-42","content":"hi"}}"#;
        let frame: GatewayFrame = serde_json::from_str(raw).unwrap();
        assert_eq!(frame.op, OP_DISPATCH);
        assert_eq!(frame.s, Some(42));
        assert_eq!(frame.t.as_deref(), Some("MESSAGE_CREATE"));
        assert_eq!(frame.d.unwrap()["guild_id"], "guild-42");
    }

    #[test]
    fn parse_heartbeat_ack() {
        let frame: GatewayFrame = serde_json::from_str(r#"{"op":11}"#).unwrap();
        assert_eq!(frame.op, OP_HEARTBEAT_ACK);
        assert!(frame.d.is_none());
        assert!(frame.s.is_none());
    }
}
