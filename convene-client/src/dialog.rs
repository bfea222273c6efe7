//! Dialogs: channels, private conversations and each connection's status stream.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use serde_json::Value;

use crate::message::{Message, kind};

/// Maximum number of messages kept per dialog.
const MAX_MESSAGES: usize = 1000;

/// Identity of a dialog. `dialog_id == ""` is the connection's status dialog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DialogKey {
    pub connection_id: String,
    pub dialog_id: String,
}

impl DialogKey {
    pub fn new(connection_id: impl Into<String>, dialog_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            dialog_id: dialog_id.into(),
        }
    }

    pub fn status(connection_id: impl Into<String>) -> Self {
        Self::new(connection_id, "")
    }
}

/// A member of a dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub nick: String,
    /// Channel mode flags, e.g. `o` or `v`. Empty for regular members.
    pub mode: String,
}

/// Partial update applied by [`Dialog::update`]. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogUpdate {
    pub name: Option<String>,
    pub topic: Option<String>,
    pub frozen: Option<String>,
}

impl From<&Message> for DialogUpdate {
    fn from(msg: &Message) -> Self {
        Self {
            name: msg.name.clone(),
            topic: msg.topic.clone(),
            frozen: msg.frozen.clone(),
        }
    }
}

/// Roster change derived from a `join`/`part`/`quit`/`nick_change`/`mode` push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantChange {
    Join { dialog_id: String, nick: String },
    Part { dialog_id: String, nick: String },
    Quit { nick: String, reason: String },
    NickChange { old_nick: String, new_nick: String },
    Mode { dialog_id: String, nick: String, mode: String },
}

impl ParticipantChange {
    /// Decode from a push event. `None` for unrelated types or missing nicks.
    pub fn from_event(event: &Message) -> Option<Self> {
        let nick = || event.nick.clone().filter(|n| !n.is_empty());
        let dialog_id = event.dialog_id().to_string();
        match event.kind() {
            "join" => Some(Self::Join { dialog_id, nick: nick()? }),
            "part" => Some(Self::Part { dialog_id, nick: nick()? }),
            "quit" => Some(Self::Quit {
                nick: nick()?,
                reason: event.text().to_string(),
            }),
            "nick_change" => Some(Self::NickChange {
                old_nick: event.extra_str("old_nick")?.to_string(),
                new_nick: event.extra_str("new_nick")?.to_string(),
            }),
            "mode" => Some(Self::Mode {
                dialog_id,
                nick: nick()?,
                mode: event.extra_str("mode").unwrap_or("").to_string(),
            }),
            _ => None,
        }
    }
}

/// A single conversation view.
#[derive(Debug, Clone, Serialize)]
pub struct Dialog {
    pub connection_id: String,
    pub dialog_id: String,
    pub name: String,
    pub topic: String,
    /// Why the dialog is unusable. Empty when it is usable.
    pub frozen: String,
    pub messages: VecDeque<Message>,
    /// Keyed by lowercase nick.
    pub participants: BTreeMap<String, Participant>,
}

impl Dialog {
    pub fn new(connection_id: &str, dialog_id: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            dialog_id: dialog_id.to_string(),
            name: dialog_id.to_string(),
            topic: String::new(),
            frozen: String::new(),
            messages: VecDeque::new(),
            participants: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> DialogKey {
        DialogKey::new(&self.connection_id, &self.dialog_id)
    }

    pub fn is(&self, connection_id: &str, dialog_id: &str) -> bool {
        self.connection_id == connection_id && self.dialog_id == dialog_id
    }

    pub fn is_status(&self) -> bool {
        self.dialog_id.is_empty()
    }

    pub fn update(&mut self, update: DialogUpdate) {
        if let Some(name) = update.name.filter(|n| !n.is_empty()) {
            self.name = name;
        }
        if let Some(topic) = update.topic {
            self.topic = topic;
        }
        if let Some(frozen) = update.frozen {
            self.frozen = frozen;
        }
    }

    /// Append to history. `participants` messages carrying a roster replace the current one.
    pub fn add_message(&mut self, mut msg: Message) {
        if msg.ts.is_none() {
            msg.ts = Some(chrono::Utc::now());
        }
        if msg.kind() == kind::PARTICIPANTS {
            if let Some(Value::Array(list)) = msg.extra.get("participants") {
                self.participants = list
                    .iter()
                    .filter_map(|p| {
                        let nick = p.get("nick")?.as_str()?.to_string();
                        let mode = p.get("mode").and_then(Value::as_str).unwrap_or("");
                        Some((
                            nick.to_lowercase(),
                            Participant {
                                nick,
                                mode: mode.to_string(),
                            },
                        ))
                    })
                    .collect();
            }
        }
        self.messages.push_back(msg);
        if self.messages.len() > MAX_MESSAGES {
            self.messages.pop_front();
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.back()
    }

    pub fn participant(&self, nick: &str) -> Option<&Participant> {
        self.participants.get(&nick.to_lowercase())
    }

    /// Apply a roster change. Changes aimed at another dialog, or at nicks
    /// that are not members here, leave the dialog untouched.
    pub fn apply_participant_update(&mut self, change: &ParticipantChange) {
        match change {
            ParticipantChange::Join { dialog_id, nick } => {
                if *dialog_id != self.dialog_id {
                    return;
                }
                self.participants.insert(
                    nick.to_lowercase(),
                    Participant {
                        nick: nick.clone(),
                        mode: String::new(),
                    },
                );
                self.add_message(Message::notice(format!("{nick} joined.")));
            }
            ParticipantChange::Part { dialog_id, nick } => {
                if *dialog_id != self.dialog_id {
                    return;
                }
                if self.participants.remove(&nick.to_lowercase()).is_some() {
                    self.add_message(Message::notice(format!("{nick} parted.")));
                }
            }
            ParticipantChange::Quit { nick, reason } => {
                if self.participants.remove(&nick.to_lowercase()).is_none() {
                    return;
                }
                let text = if reason.is_empty() {
                    format!("{nick} quit.")
                } else {
                    format!("{nick} quit: {reason}")
                };
                self.add_message(Message::notice(text));
            }
            ParticipantChange::NickChange { old_nick, new_nick } => {
                let Some(mut p) = self.participants.remove(&old_nick.to_lowercase()) else {
                    return;
                };
                p.nick = new_nick.clone();
                self.participants.insert(new_nick.to_lowercase(), p);
                self.add_message(Message::notice(format!(
                    "{old_nick} changed nick to {new_nick}."
                )));
            }
            ParticipantChange::Mode {
                dialog_id,
                nick,
                mode,
            } => {
                if *dialog_id != self.dialog_id {
                    return;
                }
                let Some(p) = self.participants.get_mut(&nick.to_lowercase()) else {
                    return;
                };
                p.mode = mode.clone();
                self.add_message(Message::notice(format!("{nick} got mode {mode}.")));
            }
        }
    }
}
