//! The owning user: dialog collection, active view and outbound transport.
//!
//! Connections never own the user; every operation that needs it borrows it.

use tokio::sync::mpsc;

use crate::dialog::{Dialog, DialogKey, DialogUpdate};
use crate::error::{ClientError, Result};
use crate::message::{Message, OutboundMessage};

/// Fire-and-forget dispatch of outbound messages to the backend.
pub trait Transport: Send {
    fn send(&mut self, msg: &OutboundMessage) -> Result<()>;
}

/// Transport backed by a channel drained by the socket writer task.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { tx }
    }

    /// A transport together with the receiving end of its channel.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, msg: &OutboundMessage) -> Result<()> {
        self.tx
            .send(msg.clone())
            .map_err(|_| ClientError::TransportClosed)
    }
}

pub struct User {
    dialogs: Vec<Dialog>,
    active: Option<DialogKey>,
    transport: Box<dyn Transport>,
}

impl User {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            dialogs: Vec::new(),
            active: None,
            transport: Box::new(transport),
        }
    }

    pub fn send(&mut self, msg: &OutboundMessage) -> Result<()> {
        self.transport.send(msg)
    }

    pub fn dialogs(&self) -> &[Dialog] {
        &self.dialogs
    }

    pub fn dialogs_mut(&mut self) -> impl Iterator<Item = &mut Dialog> {
        self.dialogs.iter_mut()
    }

    pub fn find(&self, connection_id: &str, dialog_id: &str) -> Option<&Dialog> {
        self.dialogs.iter().find(|d| d.is(connection_id, dialog_id))
    }

    pub fn find_mut(&mut self, connection_id: &str, dialog_id: &str) -> Option<&mut Dialog> {
        self.dialogs
            .iter_mut()
            .find(|d| d.is(connection_id, dialog_id))
    }

    /// The dialog `msg` refers to, created if missing, updated from the message
    /// (`name`, `topic`, `frozen`) if present.
    pub fn ensure_dialog(&mut self, msg: &Message) -> &mut Dialog {
        let connection_id = msg.connection_id.as_str();
        let dialog_id = msg.dialog_id();
        let idx = match self.dialogs.iter().position(|d| d.is(connection_id, dialog_id)) {
            Some(idx) => idx,
            None => {
                tracing::debug!(connection_id, dialog_id, "creating dialog");
                self.dialogs.push(Dialog::new(connection_id, dialog_id));
                self.dialogs.len() - 1
            }
        };
        let dialog = &mut self.dialogs[idx];
        dialog.update(DialogUpdate::from(msg));
        dialog
    }

    pub fn active_key(&self) -> Option<&DialogKey> {
        self.active.as_ref()
    }

    pub fn set_active(&mut self, key: Option<DialogKey>) {
        self.active = key;
    }

    pub fn active_dialog(&self) -> Option<&Dialog> {
        let key = self.active.as_ref()?;
        self.find(&key.connection_id, &key.dialog_id)
    }

    pub fn active_dialog_mut(&mut self) -> Option<&mut Dialog> {
        let key = self.active.clone()?;
        self.find_mut(&key.connection_id, &key.dialog_id)
    }

    /// Drop every dialog matching `remove`. When the active dialog was among them,
    /// the view moves to the first remaining dialog, or to nothing.
    pub fn remove_dialogs(&mut self, mut remove: impl FnMut(&Dialog) -> bool) -> usize {
        let before = self.dialogs.len();
        self.dialogs.retain(|d| !remove(d));
        let removed = before - self.dialogs.len();

        let active_gone = self
            .active
            .as_ref()
            .is_some_and(|k| self.find(&k.connection_id, &k.dialog_id).is_none());
        if active_gone {
            self.active = self.dialogs.first().map(Dialog::key);
        }
        removed
    }
}
