//! One chat-network connection of a user.
//!
//! The connection is split into submodules by facet:
//! - [`router`]: `/command` input → outbound `send` request
//! - [`replies`]: pending-reply registry, timeouts and per-command reply handlers
//! - [`state`]: unsolicited server pushes folded into connection/dialog state
//!
//! Inbound chat messages and local notices are folded here ([`Connection::add_message`],
//! [`Connection::on_message`]).

pub mod replies;
pub mod router;
pub mod state;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::commands::AliasTable;
use crate::dialog::Dialog;
use crate::ids::MessageIds;
use crate::message::{Frame, Message, kind};
use crate::user::User;

pub use replies::{ReplyCallback, ReplyHandler, SentHandler};

/// How long a sent command waits for its reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Last known transport state of a connection. Unknown states are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Other(String),
}

impl ConnectionState {
    pub fn as_str(&self) -> &str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Other(s) => s,
        }
    }

    /// Capitalized form, used as a frozen reason.
    pub fn label(&self) -> String {
        let s = self.as_str();
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl From<String> for ConnectionState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "disconnected" => ConnectionState::Disconnected,
            "connecting" => ConnectionState::Connecting,
            "connected" => ConnectionState::Connected,
            _ => ConnectionState::Other(s),
        }
    }
}

impl From<ConnectionState> for String {
    fn from(s: ConnectionState) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// This user's identity on the network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Me {
    pub nick: String,
}

/// Attributes assignable through [`Connection::update`]. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ConnectionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wanted_state: Option<ConnectionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_connect_commands: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<Me>,
}

pub struct Connection {
    pub connection_id: String,
    pub name: String,
    pub me: Me,
    pub protocol: String,
    pub state: ConnectionState,
    pub wanted_state: ConnectionState,
    pub on_connect_commands: Vec<String>,
    pub url: String,

    aliases: Arc<AliasTable>,
    ids: Arc<MessageIds>,
    reply_timeout: Duration,
    pending: HashMap<u64, replies::PendingReply>,
}

impl Connection {
    pub fn new(
        connection_id: impl Into<String>,
        name: impl Into<String>,
        aliases: Arc<AliasTable>,
        ids: Arc<MessageIds>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            name: name.into(),
            me: Me::default(),
            protocol: "unknown".to_string(),
            state: ConnectionState::Disconnected,
            wanted_state: ConnectionState::Connected,
            on_connect_commands: Vec::new(),
            url: String::new(),
            aliases,
            ids,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            pending: HashMap::new(),
        }
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Assign the given attributes. Reporting a state also (un)freezes the status dialog.
    pub fn update(&mut self, user: &mut User, attrs: ConnectionUpdate) {
        if let Some(name) = attrs.name {
            self.name = name;
        }
        if let Some(protocol) = attrs.protocol {
            self.protocol = protocol;
        }
        if let Some(url) = attrs.url {
            self.url = url;
        }
        if let Some(wanted) = attrs.wanted_state {
            self.wanted_state = wanted;
        }
        if let Some(commands) = attrs.on_connect_commands {
            self.on_connect_commands = commands;
        }
        if let Some(me) = attrs.me {
            self.me = me;
        }
        if let Some(state) = attrs.state {
            let frozen = if state == ConnectionState::Connected {
                ""
            } else {
                "Not connected."
            };
            if let Some(status) = user.find_mut(&self.connection_id, "") {
                status.frozen = frozen.to_string();
            }
            self.state = state;
        }
    }

    /// Dialogs belonging to this connection.
    pub fn dialogs<'u>(&self, user: &'u User) -> impl Iterator<Item = &'u Dialog> + use<'u> {
        let id = self.connection_id.clone();
        user.dialogs().iter().filter(move |d| d.connection_id == id)
    }

    pub fn get_dialog<'u>(&self, user: &'u User, dialog_id: &str) -> Option<&'u Dialog> {
        user.find(&self.connection_id, dialog_id)
    }

    /// Route one inbound frame addressed to this connection.
    pub fn handle_frame(&mut self, user: &mut User, frame: Frame) {
        match frame {
            Frame::Sent(reply) => {
                let reply = self.adopt(reply);
                self.on_sent(user, reply);
            }
            Frame::State(event) => {
                let event = self.adopt(event);
                self.on_state(user, event);
            }
            Frame::Message(msg) => {
                let msg = self.adopt(msg);
                self.on_message(user, msg);
            }
        }
    }

    /// Inbound chat message: errors go to the shared error handler, everything
    /// else lands in its (possibly new) dialog.
    pub fn on_message(&mut self, user: &mut User, msg: Message) {
        if msg.has_errors() {
            return self.on_error(user, msg);
        }
        if msg.dialog_id().is_empty() {
            return self.add_message(user, msg);
        }
        user.ensure_dialog(&msg).add_message(msg);
    }

    /// Fold a message into the dialog it names, this connection's status dialog
    /// when it names none, or the active dialog as a last resort.
    ///
    /// Untyped messages without a dialog id become `private`. Messages with no
    /// resolvable dialog are dropped.
    pub fn add_message(&self, user: &mut User, mut msg: Message) {
        if msg.dialog_id().is_empty() && msg.kind.is_none() {
            msg.kind = Some(kind::PRIVATE.to_string());
        }
        if msg.from.is_none() {
            msg.from = Some(self.connection_id.clone());
        }
        let msg = self.adopt(msg);

        if let Some(dialog) = user.find_mut(&self.connection_id, msg.dialog_id()) {
            dialog.add_message(msg);
            return;
        }
        if let Some(dialog) = user.active_dialog_mut() {
            dialog.add_message(msg);
            return;
        }
        tracing::warn!(
            connection_id = %self.connection_id,
            dialog_id = msg.dialog_id(),
            "could not dispatch message: {}",
            msg.text()
        );
    }

    fn adopt(&self, mut msg: Message) -> Message {
        if msg.connection_id.is_empty() {
            msg.connection_id = self.connection_id.clone();
        }
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::ChannelTransport;

    fn setup() -> (Connection, User) {
        let conn = Connection::new(
            "irc-libera",
            "Libera",
            Arc::new(AliasTable::builtin()),
            Arc::new(MessageIds::new()),
        );
        let (transport, _rx) = ChannelTransport::pair();
        let user = User::new(transport);
        (conn, user)
    }

    fn in_dialog(dialog_id: &str) -> Message {
        Message {
            connection_id: "irc-libera".into(),
            dialog_id: Some(dialog_id.into()),
            ..Default::default()
        }
    }

    #[test]
    fn state_roundtrips_through_strings() {
        let s: ConnectionState = serde_json::from_str("\"connected\"").unwrap();
        assert_eq!(s, ConnectionState::Connected);
        let s: ConnectionState = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(s, ConnectionState::Other("queued".into()));
        assert_eq!(s.label(), "Queued");
        assert_eq!(ConnectionState::Disconnected.label(), "Disconnected");
    }

    #[test]
    fn update_freezes_status_dialog() {
        let (mut conn, mut user) = setup();
        user.ensure_dialog(&in_dialog(""));
        conn.update(
            &mut user,
            ConnectionUpdate {
                state: Some(ConnectionState::Disconnected),
                name: Some("Libera.Chat".into()),
                ..Default::default()
            },
        );
        assert_eq!(conn.name, "Libera.Chat");
        assert_eq!(user.find("irc-libera", "").unwrap().frozen, "Not connected.");

        conn.update(
            &mut user,
            ConnectionUpdate {
                state: Some(ConnectionState::Connected),
                ..Default::default()
            },
        );
        assert_eq!(user.find("irc-libera", "").unwrap().frozen, "");
    }

    #[test]
    fn update_without_status_dialog_is_harmless() {
        let (mut conn, mut user) = setup();
        conn.update(
            &mut user,
            ConnectionUpdate {
                state: Some(ConnectionState::Connecting),
                ..Default::default()
            },
        );
        assert_eq!(conn.state, ConnectionState::Connecting);
    }

    #[test]
    fn message_without_dialog_goes_to_status_as_private() {
        let (conn, mut user) = setup();
        user.ensure_dialog(&in_dialog(""));
        conn.add_message(
            &mut user,
            Message {
                message: Some("hello".into()),
                ..Default::default()
            },
        );
        let last = user.find("irc-libera", "").unwrap().last_message().unwrap();
        assert_eq!(last.kind(), kind::PRIVATE);
        assert_eq!(last.from.as_deref(), Some("irc-libera"));
    }

    #[test]
    fn message_falls_back_to_active_dialog() {
        let (conn, mut user) = setup();
        let other = Message {
            connection_id: "irc-oftc".into(),
            dialog_id: Some("#debian".into()),
            ..Default::default()
        };
        let key = user.ensure_dialog(&other).key();
        user.set_active(Some(key));
        conn.add_message(&mut user, Message::notice("over here"));
        let last = user.find("irc-oftc", "#debian").unwrap().last_message().unwrap();
        assert_eq!(last.text(), "over here");
    }

    #[test]
    fn unroutable_message_is_dropped() {
        let (conn, mut user) = setup();
        conn.add_message(&mut user, Message::notice("nowhere"));
        assert!(user.dialogs().is_empty());
    }

    #[test]
    fn inbound_chat_message_creates_dialog() {
        let (mut conn, mut user) = setup();
        let mut msg = in_dialog("#rust");
        msg.message = Some("hi all".into());
        msg.from = Some("alice".into());
        conn.handle_frame(&mut user, Frame::Message(msg));
        let dialog = conn.get_dialog(&user, "#rust").unwrap();
        assert_eq!(dialog.last_message().unwrap().text(), "hi all");
        assert_eq!(conn.dialogs(&user).count(), 1);
    }
}
