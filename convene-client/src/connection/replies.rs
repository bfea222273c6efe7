//! Reply correlation.
//!
//! Every outbound request gets one [`PendingReply`] keyed by its id. It is resolved
//! exactly once: by the matching `sent` frame ([`Connection::on_sent`]) or by the
//! timeout sweep ([`Connection::expire_pending`]). Both paths remove the entry from
//! the registry first, so whichever runs second finds nothing and does nothing.

use tokio::time::Instant;

use super::Connection;
use crate::message::{Message, OutboundMessage, kind};
use crate::user::User;

/// Caller-supplied reply handler, used instead of the per-command default.
pub type ReplyCallback = Box<dyn FnOnce(&mut Connection, &mut User, Message) + Send>;

/// Default reply handler, selected by command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentHandler {
    Close,
    Join,
    Names,
    Part,
    Query,
    Reconnect,
    Topic,
    Whois,
    /// Everything else: only reports server errors.
    Error,
}

impl SentHandler {
    pub fn for_command(command: &str) -> Self {
        match command.to_ascii_lowercase().as_str() {
            "close" => SentHandler::Close,
            "join" => SentHandler::Join,
            "names" => SentHandler::Names,
            "part" => SentHandler::Part,
            "query" => SentHandler::Query,
            "reconnect" => SentHandler::Reconnect,
            "topic" => SentHandler::Topic,
            "whois" => SentHandler::Whois,
            _ => SentHandler::Error,
        }
    }
}

pub enum ReplyHandler {
    Command(SentHandler),
    Callback(ReplyCallback),
}

pub(crate) struct PendingReply {
    pub(crate) request: OutboundMessage,
    pub(crate) handler: ReplyHandler,
    pub(crate) deadline: Instant,
}

impl Connection {
    pub(crate) fn register_reply(
        &mut self,
        request: OutboundMessage,
        handler: ReplyHandler,
        now: Instant,
    ) {
        let id = request.id;
        let pending = PendingReply {
            request,
            handler,
            deadline: now + self.reply_timeout,
        };
        if self.pending.insert(id, pending).is_some() {
            tracing::warn!(connection_id = %self.connection_id, id, "replaced pending reply");
        }
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_replies(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    /// Earliest timeout among pending requests.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Drop every pending request without firing anything.
    pub(crate) fn clear_pending(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    /// A `sent` frame arrived. Replies with no waiter (late, duplicate, or for
    /// another session) are ignored.
    pub fn on_sent(&mut self, user: &mut User, reply: Message) {
        let Some(id) = reply.id else {
            tracing::debug!(connection_id = %self.connection_id, "sent frame without id");
            return;
        };
        let Some(pending) = self.pending.remove(&id) else {
            tracing::debug!(connection_id = %self.connection_id, id, "no waiter for reply");
            return;
        };
        tracing::debug!(
            connection_id = %self.connection_id,
            id,
            message = %pending.request.message,
            "reply received"
        );
        match pending.handler {
            ReplyHandler::Callback(callback) => callback(self, user, reply),
            ReplyHandler::Command(_) if reply.has_errors() => self.on_error(user, reply),
            ReplyHandler::Command(handler) => self.dispatch_sent(user, handler, reply),
        }
    }

    /// Fire the timeout for every request whose deadline is at or before `now`.
    /// Returns how many expired.
    pub fn expire_pending(&mut self, user: &mut User, now: Instant) -> usize {
        let mut expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired.sort_unstable();

        for id in &expired {
            let Some(pending) = self.pending.remove(id) else {
                continue;
            };
            let request = pending.request;
            tracing::warn!(
                connection_id = %self.connection_id,
                id,
                message = %request.message,
                "no response before timeout"
            );
            let text = format!("No response on \"{}\".", request.message);
            self.add_message(user, request.to_local(kind::ERROR, text));
        }
        expired.len()
    }

    fn dispatch_sent(&mut self, user: &mut User, handler: SentHandler, reply: Message) {
        match handler {
            SentHandler::Close => self.sent_close(user, reply),
            SentHandler::Join | SentHandler::Query => self.sent_join(user, reply),
            SentHandler::Names => self.sent_names(user, reply),
            SentHandler::Part => self.sent_part(user, reply),
            SentHandler::Reconnect => self.sent_reconnect(user),
            SentHandler::Topic => self.sent_topic(user, reply),
            SentHandler::Whois => self.sent_whois(user, reply),
            SentHandler::Error => self.on_error(user, reply),
        }
    }

    /// Shared error handler: folds `"<message>: <first error>"` into the target dialog.
    /// Messages without errors are ignored.
    pub fn on_error(&mut self, user: &mut User, msg: Message) {
        let Some(first) = msg.errors.first() else {
            return;
        };
        let text = format!("{}: {}", msg.text(), first.message);
        let error = Message {
            connection_id: msg.connection_id.clone(),
            dialog_id: msg.dialog_id.clone(),
            from: Some(self.connection_id.clone()),
            ..Message::error(text)
        };
        user.ensure_dialog(&msg).add_message(error);
    }

    fn sent_close(&mut self, user: &mut User, reply: Message) {
        let connection_id = self.connection_id.clone();
        let dialog_id = reply.dialog_id().to_string();
        let removed = user.remove_dialogs(|d| d.is(&connection_id, &dialog_id));
        tracing::debug!(%connection_id, %dialog_id, removed, "closed dialog");
    }

    fn sent_join(&mut self, user: &mut User, reply: Message) {
        let key = user.ensure_dialog(&reply).key();
        user.set_active(Some(key));
    }

    fn sent_names(&mut self, user: &mut User, mut reply: Message) {
        reply.kind = Some(kind::PARTICIPANTS.to_string());
        self.add_message(user, reply);
    }

    /// Parting leaves the dialog open.
    fn sent_part(&mut self, user: &mut User, mut reply: Message) {
        reply.kind = Some(kind::NOTICE.to_string());
        reply.message = Some(format!("You parted {}.", reply.dialog_id()));
        self.add_message(user, reply);
    }

    fn sent_reconnect(&mut self, user: &mut User) {
        self.add_message(user, Message::notice("Reconnecting..."));
    }

    fn sent_topic(&mut self, user: &mut User, mut reply: Message) {
        let name = self
            .get_dialog(user, reply.dialog_id())
            .map(|d| d.name.clone())
            .unwrap_or_else(|| reply.dialog_id().to_string());
        let text = match reply.topic.as_deref().filter(|t| !t.is_empty()) {
            Some(topic) => format!("Topic for {name} is: {topic}"),
            None => format!("There is no topic for {name}."),
        };
        reply.kind = Some(kind::NOTICE.to_string());
        reply.message = Some(text);
        self.add_message(user, reply);
    }

    fn sent_whois(&mut self, user: &mut User, mut reply: Message) {
        reply.kind = Some(kind::WHOIS.to_string());
        user.ensure_dialog(&reply).add_message(reply);
    }
}
