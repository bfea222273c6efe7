//! Wire types exchanged with the chat backend.
//!
//! Every inbound frame carries an `event` discriminator:
//! - `sent`: a reply correlated to one of our outbound messages by `id`
//! - `state`: an unsolicited push (connection state, joins, nick changes, ...)
//! - `message`: a chat message for some dialog
//!
//! The payload shape is shared between the three, so they all decode into [`Message`].
//! Fields this crate does not know about are kept in [`Message::extra`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message types this crate produces or interprets.
pub mod kind {
    pub const PRIVATE: &str = "private";
    pub const NOTICE: &str = "notice";
    pub const ERROR: &str = "error";
    pub const PARTICIPANTS: &str = "participants";
    pub const WHOIS: &str = "whois";
}

/// `method` value of every outbound message.
pub const SEND_METHOD: &str = "send";

/// One structured error in a reply's `errors` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Reply, push event or chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub connection_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog_id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// A locally generated message of the given type.
    pub fn local(kind: &str, text: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.to_string()),
            message: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::local(kind::NOTICE, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::local(kind::ERROR, text)
    }

    /// The referenced dialog id, `""` when absent.
    pub fn dialog_id(&self) -> &str {
        self.dialog_id.as_deref().unwrap_or("")
    }

    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or("")
    }

    pub fn text(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// String field from the unknown-field bag.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// Inbound frame, discriminated by `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Frame {
    Sent(Message),
    State(Message),
    Message(Message),
}

impl Frame {
    pub fn connection_id(&self) -> &str {
        match self {
            Frame::Sent(m) | Frame::State(m) | Frame::Message(m) => &m.connection_id,
        }
    }

    pub fn message_mut(&mut self) -> &mut Message {
        match self {
            Frame::Sent(m) | Frame::State(m) | Frame::Message(m) => m,
        }
    }
}

/// Outbound request handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub method: String,
    pub id: u64,
    pub connection_id: String,
    pub dialog_id: String,
    pub message: String,
}

impl OutboundMessage {
    /// The message echoed back as a local message, used for timeout and dispatch errors.
    pub(crate) fn to_local(&self, kind: &str, text: String) -> Message {
        Message {
            id: Some(self.id),
            connection_id: self.connection_id.clone(),
            dialog_id: Some(self.dialog_id.clone()),
            kind: Some(kind.to_string()),
            message: Some(text),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_decodes_reply_with_errors() {
        let json = r##"{"event":"sent","id":7,"connection_id":"irc-libera","dialog_id":"#rust",
            "message":"/join #rust","errors":[{"message":"Banned","path":"/dialog_id"}]}"##;
        let frame: Frame = serde_json::from_str(json).unwrap();
        let Frame::Sent(msg) = frame else {
            panic!("expected sent frame");
        };
        assert_eq!(msg.id, Some(7));
        assert_eq!(msg.dialog_id(), "#rust");
        assert!(msg.has_errors());
        assert_eq!(msg.errors[0].message, "Banned");
        assert!(msg.extra.is_empty());
    }

    #[test]
    fn unknown_fields_are_kept() {
        let json = r#"{"event":"state","type":"nick_change","connection_id":"irc-a","old_nick":"a","new_nick":"b"}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.connection_id(), "irc-a");
        let Frame::State(msg) = frame else {
            panic!("expected state frame");
        };
        assert_eq!(msg.kind(), "nick_change");
        assert_eq!(msg.extra_str("old_nick"), Some("a"));
        assert_eq!(msg.extra_str("new_nick"), Some("b"));
    }

    #[test]
    fn outbound_serializes_flat() {
        let out = OutboundMessage {
            method: SEND_METHOD.to_string(),
            id: 3,
            connection_id: "irc-a".into(),
            dialog_id: "#foo".into(),
            message: "/names".into(),
        };
        let v: Value = serde_json::to_value(&out).unwrap();
        assert_eq!(v["method"], "send");
        assert_eq!(v["id"], 3);
        assert_eq!(v["dialog_id"], "#foo");
    }
}
