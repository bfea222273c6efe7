//! User input → outbound `send` request.

use tokio::time::Instant;

use super::Connection;
use super::replies::{ReplyCallback, ReplyHandler, SentHandler};
use crate::commands::Action;
use crate::message::{OutboundMessage, SEND_METHOD, kind};
use crate::user::User;

impl Connection {
    /// Send user input, resolving aliases and the target dialog. The reply is handled
    /// by the default handler for the command. Returns the request id, or `None` if
    /// the transport refused the message (an error is folded in instead).
    ///
    /// `dialog_id` is the dialog the input was typed into, when known.
    pub fn send(
        &mut self,
        user: &mut User,
        text: &str,
        dialog_id: Option<&str>,
        now: Instant,
    ) -> Option<u64> {
        self.dispatch(user, text, dialog_id, None, now)
    }

    /// Like [`send`](Self::send), but the reply goes to `callback` instead.
    pub fn send_with(
        &mut self,
        user: &mut User,
        text: &str,
        dialog_id: Option<&str>,
        now: Instant,
        callback: ReplyCallback,
    ) -> Option<u64> {
        self.dispatch(user, text, dialog_id, Some(callback), now)
    }

    fn dispatch(
        &mut self,
        user: &mut User,
        text: &str,
        dialog_id: Option<&str>,
        callback: Option<ReplyCallback>,
        now: Instant,
    ) -> Option<u64> {
        let (message, action) = self.aliases.rewrite(text);
        let request = OutboundMessage {
            method: SEND_METHOD.to_string(),
            id: self.ids.next(),
            connection_id: self.connection_id.clone(),
            dialog_id: self.target_dialog(user, dialog_id, &action),
            message,
        };

        if let Err(e) = user.send(&request) {
            tracing::warn!(connection_id = %self.connection_id, id = request.id, "send failed: {e}");
            let error = request.to_local(kind::ERROR, format!("{e} ({text})"));
            self.add_message(user, error);
            return None;
        }
        tracing::debug!(
            connection_id = %self.connection_id,
            id = request.id,
            dialog_id = %request.dialog_id,
            command = %action.command,
            "sent"
        );

        let id = request.id;
        let handler = match callback {
            Some(callback) => ReplyHandler::Callback(callback),
            None => ReplyHandler::Command(SentHandler::for_command(&action.command)),
        };
        self.register_reply(request, handler, now);
        Some(id)
    }

    /// Explicit dialog, else the dialog named by the command's first argument
    /// (an empty argument names the status dialog), else the active dialog.
    fn target_dialog(&self, user: &User, dialog_id: Option<&str>, action: &Action) -> String {
        if let Some(id) = dialog_id {
            return id.to_string();
        }
        if let Some(dialog) = self.get_dialog(user, &action.target) {
            return dialog.dialog_id.clone();
        }
        user.active_dialog()
            .map(|d| d.dialog_id.clone())
            .unwrap_or_default()
    }
}
