//! Wire protocol for the Portside live channel.
//!
//! Every frame on the channel is an [`Envelope`]: a versioned wrapper around
//! a message kind and an arbitrary JSON payload. Both the panel client and
//! the server speak this format; the recognized kinds live in [`kind`] and
//! the clickable-element action ids in [`action`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current envelope schema version. Reserved for future evolution; receivers
/// reject frames carrying any other value.
pub const PROTOCOL_VERSION: u8 = 1;

/// Message kinds recognized on the live channel. Unrecognized kinds are
/// still delivered to listeners; they are ignored by the known subscribers.
pub mod kind {
    /// Server heartbeat, sent on a fixed interval. The payload carries the
    /// server's unix timestamp but has no semantics beyond presence.
    pub const TIME: &str = "time";
    /// Connection state of some history item changed elsewhere; clients
    /// should refresh their list with the currently active query.
    pub const CONNECTIONS_CHANGED: &str = "connections-changed";
    /// Client-originated search notification; the server answers with a
    /// [`REFRESH`] broadcast.
    pub const HISTORY_SEARCH: &str = "history-search";
    /// Server reply to [`HISTORY_SEARCH`].
    pub const REFRESH: &str = "refresh";
}

/// Action ids carried by clickable elements in the list fragment. The
/// `{id}` placeholder is literal; payload identity travels separately in
/// the `data-action-payload` attribute.
pub mod action {
    pub const CONNECT: &str = "history-item-raw/{id}/connect";
    pub const DISCONNECT: &str = "history-item-raw/{id}/disconnect";
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
}

/// The wire unit of the live channel: `{version, type, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u8,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind: kind.into(),
            data,
        }
    }

    pub fn is_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }

    /// Parse a single inbound frame. Fails on anything that is not a JSON
    /// envelope of the current schema version.
    pub fn from_json(frame: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(frame)?;
        if !envelope.is_compatible() {
            return Err(ProtocolError::UnsupportedVersion(envelope.version));
        }
        Ok(envelope)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serde_shape() {
        let envelope = Envelope::new(kind::TIME, serde_json::json!("1700000000"));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["type"], "time");
        assert_eq!(json["data"], "1700000000");
    }

    #[test]
    fn envelope_roundtrip() {
        let envelope = Envelope::new(
            kind::CONNECTIONS_CHANGED,
            serde_json::Value::Null,
        );
        let rt = Envelope::from_json(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(rt, envelope);
    }

    #[test]
    fn missing_data_defaults_to_null() {
        let envelope = Envelope::from_json(r#"{"version":1,"type":"refresh"}"#).unwrap();
        assert_eq!(envelope.kind, kind::REFRESH);
        assert!(envelope.data.is_null());
    }

    #[test]
    fn unknown_kind_is_preserved() {
        let envelope =
            Envelope::from_json(r#"{"version":1,"type":"something-new","data":{"a":1}}"#).unwrap();
        assert_eq!(envelope.kind, "something-new");
        assert_eq!(envelope.data["a"], 1);
    }

    #[test]
    fn wrong_version_is_rejected() {
        let err = Envelope::from_json(r#"{"version":2,"type":"time","data":null}"#).unwrap_err();
        match err {
            ProtocolError::UnsupportedVersion(v) => assert_eq!(v, 2),
            other => panic!("expected UnsupportedVersion, got {other:?}"),
        }
    }

    #[test]
    fn greeting_is_not_an_envelope() {
        assert!(matches!(
            Envelope::from_json("Hello Server!"),
            Err(ProtocolError::Malformed(_))
        ));
    }
}
