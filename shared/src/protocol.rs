use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use ts_rs::TS;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Event name for client action messages (both directions).
pub const MESSAGE_EVENT: &str = "message";

/// Event name for the handshake sent to a freshly connected client.
pub const WELCOME_EVENT: &str = "welcome";

/// Opaque application payload.
///
/// Holds the exact JSON text the sender put on the wire. Cloning is cheap
/// (shared buffer) and serializing writes the original bytes back out, so a
/// relayed payload is never re-formatted.
#[derive(Clone)]
pub struct Payload(Arc<RawValue>);

impl Payload {
    /// Parse `json` as a payload. Fails only if `json` is not valid JSON.
    pub fn from_json(json: impl Into<String>) -> Result<Self, serde_json::Error> {
        RawValue::from_string(json.into()).map(Self::from)
    }

    /// The JSON `null` payload, used when a frame carries no `data`.
    pub fn null() -> Self {
        Self::from(RawValue::NULL.to_owned())
    }

    /// Raw JSON text, exactly as received.
    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    /// Deserialize the payload into a concrete type.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(self.as_str())
    }
}

impl From<Box<RawValue>> for Payload {
    fn from(raw: Box<RawValue>) -> Self {
        Self(Arc::from(raw))
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Payload {}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Payload").field(&self.as_str()).finish()
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Box::<RawValue>::deserialize(deserializer).map(Self::from)
    }
}

/// One text frame on the WebSocket: `{"type": <event>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../public/generated/")]
pub struct Frame {
    #[serde(rename = "type")]
    pub event: String,
    #[serde(default = "Payload::null")]
    #[ts(type = "unknown")]
    pub data: Payload,
}

impl Frame {
    pub fn message(payload: Payload) -> Self {
        Self {
            event: MESSAGE_EVENT.to_string(),
            data: payload,
        }
    }

    pub fn welcome(msg: &WelcomeMsg) -> Result<Self, serde_json::Error> {
        let raw = serde_json::value::to_raw_value(msg)?;
        Ok(Self {
            event: WELCOME_EVENT.to_string(),
            data: Payload::from(raw),
        })
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn is_message(&self) -> bool {
        self.event == MESSAGE_EVENT
    }

    pub fn is_welcome(&self) -> bool {
        self.event == WELCOME_EVENT
    }
}

/// Handshake payload telling a client who it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../public/generated/")]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMsg {
    pub protocol_version: u32,
    pub server_version: String,
    #[ts(type = "number")]
    pub session_id: u64,
}
