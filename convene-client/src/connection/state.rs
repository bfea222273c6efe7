//! Folding of unsolicited server pushes (`state` frames).
//!
//! | type | effect |
//! |------|--------|
//! | `connection` | new state, status dialog (un)frozen, notice |
//! | `frozen` | status dialog frozen reason; target dialog ensured |
//! | `join`, `part` | roster update on every dialog of the connection |
//! | `me` | own nick; notice when it changed |
//! | `mode`, `nick_change`, `quit` | roster update, event stamped per dialog |
//! | `topic` | target dialog ensured/updated |
//!
//! States are not checked against an automaton: the backend is authoritative.

use super::{Connection, ConnectionState};
use crate::dialog::{DialogUpdate, ParticipantChange};
use crate::message::Message;
use crate::user::User;

impl Connection {
    pub fn on_state(&mut self, user: &mut User, event: Message) {
        tracing::debug!(
            connection_id = %self.connection_id,
            kind = event.kind(),
            "state event"
        );
        let kind = event.kind().to_string();
        match kind.as_str() {
            "connection" => self.on_connection_state(user, &event),
            "frozen" => {
                if let Some(status) = user.find_mut(&self.connection_id, "") {
                    status.update(DialogUpdate {
                        frozen: event.frozen.clone(),
                        ..Default::default()
                    });
                }
                user.ensure_dialog(&event);
            }
            "join" | "part" => {
                let Some(change) = ParticipantChange::from_event(&event) else {
                    return;
                };
                for dialog in user
                    .dialogs_mut()
                    .filter(|d| d.connection_id == self.connection_id)
                {
                    dialog.apply_participant_update(&change);
                }
            }
            "me" => {
                let nick = event.nick.clone().unwrap_or_default();
                if !self.me.nick.is_empty() && self.me.nick != nick {
                    self.add_message(user, Message::notice(format!("You changed nick to {nick}.")));
                }
                self.me.nick = nick;
            }
            "mode" | "nick_change" | "quit" => {
                let mut stamped = event;
                for dialog in user
                    .dialogs_mut()
                    .filter(|d| d.connection_id == self.connection_id)
                {
                    stamped.dialog_id = Some(dialog.dialog_id.clone());
                    if let Some(change) = ParticipantChange::from_event(&stamped) {
                        dialog.apply_participant_update(&change);
                    }
                }
            }
            "topic" => {
                user.ensure_dialog(&event);
            }
            _ => {}
        }
    }

    fn on_connection_state(&mut self, user: &mut User, event: &Message) {
        let state = ConnectionState::from(event.state.clone().unwrap_or_default());
        let reason = event.message.as_deref().filter(|m| !m.is_empty());

        let notice = match reason {
            Some(reason) => format!("Connection state changed to {state}: {reason}"),
            None => format!("Connection state changed to {state}."),
        };
        let frozen = match (&state, reason) {
            (ConnectionState::Connected, _) => String::new(),
            (_, Some(reason)) => reason.to_string(),
            (_, None) => state.label(),
        };
        tracing::info!(
            connection_id = %self.connection_id,
            from = %self.state,
            to = %state,
            "connection state changed"
        );

        self.state = state;
        if let Some(status) = user.find_mut(&self.connection_id, "") {
            status.frozen = frozen;
        }
        self.add_message(user, Message::notice(notice));
    }
}
