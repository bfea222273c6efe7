//! The client session: one user, all of their connections, and the event loop.
//!
//! Everything runs on one task. Inbound frames and user input arrive over channels
//! and are handled one at a time, in arrival order; reply timeouts are driven by
//! sleeping until the earliest pending deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::api::{ConnectionApi, ConnectionInfo, RoomList};
use crate::commands::AliasTable;
use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionUpdate, ReplyCallback};
use crate::error::{ClientError, Result};
use crate::ids::MessageIds;
use crate::message::{Frame, Message};
use crate::user::User;

/// User input for [`Client::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Send {
        connection_id: String,
        text: String,
        dialog_id: Option<String>,
    },
    Shutdown,
}

pub struct Client {
    user: User,
    connections: Vec<Connection>,
    aliases: Arc<AliasTable>,
    ids: Arc<MessageIds>,
    reply_timeout: Duration,
}

impl Client {
    pub fn new(user: User, config: &ClientConfig) -> Self {
        let aliases = config.alias_table();
        tracing::debug!(aliases = aliases.len(), "alias table built");
        Self {
            user,
            connections: Vec::new(),
            aliases: Arc::new(aliases),
            ids: Arc::new(MessageIds::new()),
            reply_timeout: config.reply_timeout(),
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_mut(&mut self) -> &mut User {
        &mut self.user
    }

    pub fn ids(&self) -> &Arc<MessageIds> {
        &self.ids
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connection(&self, connection_id: &str) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.connection_id == connection_id)
    }

    /// Add the connection (with its status dialog) if unknown, then apply `info`'s attributes.
    pub fn ensure_connection(&mut self, info: ConnectionInfo) -> &mut Connection {
        let idx = match self
            .connections
            .iter()
            .position(|c| c.connection_id == info.connection_id)
        {
            Some(idx) => idx,
            None => {
                let name = info
                    .attrs
                    .name
                    .clone()
                    .unwrap_or_else(|| info.connection_id.clone());
                tracing::info!(connection_id = %info.connection_id, "adding connection");
                self.user.ensure_dialog(&Message {
                    connection_id: info.connection_id.clone(),
                    dialog_id: Some(String::new()),
                    name: Some(name.clone()),
                    ..Default::default()
                });
                self.connections.push(
                    Connection::new(
                        info.connection_id.clone(),
                        name,
                        self.aliases.clone(),
                        self.ids.clone(),
                    )
                    .with_reply_timeout(self.reply_timeout),
                );
                self.connections.len() - 1
            }
        };
        let conn = &mut self.connections[idx];
        conn.update(&mut self.user, info.attrs);
        conn
    }

    pub fn send(
        &mut self,
        connection_id: &str,
        text: &str,
        dialog_id: Option<&str>,
    ) -> Result<Option<u64>> {
        self.send_at(connection_id, text, dialog_id, Instant::now())
    }

    pub fn send_at(
        &mut self,
        connection_id: &str,
        text: &str,
        dialog_id: Option<&str>,
        now: Instant,
    ) -> Result<Option<u64>> {
        let conn = self
            .connections
            .iter_mut()
            .find(|c| c.connection_id == connection_id)
            .ok_or_else(|| ClientError::UnknownConnection(connection_id.to_string()))?;
        Ok(conn.send(&mut self.user, text, dialog_id, now))
    }

    pub fn send_with(
        &mut self,
        connection_id: &str,
        text: &str,
        dialog_id: Option<&str>,
        callback: ReplyCallback,
    ) -> Result<Option<u64>> {
        let conn = self
            .connections
            .iter_mut()
            .find(|c| c.connection_id == connection_id)
            .ok_or_else(|| ClientError::UnknownConnection(connection_id.to_string()))?;
        Ok(conn.send_with(&mut self.user, text, dialog_id, Instant::now(), callback))
    }

    /// Route a frame to its connection. Frames for unknown (or removed) connections are dropped.
    pub fn handle_frame(&mut self, frame: Frame) {
        let connection_id = frame.connection_id();
        let Some(conn) = self
            .connections
            .iter_mut()
            .find(|c| c.connection_id == connection_id)
        else {
            tracing::debug!(connection_id, "frame for unknown connection dropped");
            return;
        };
        conn.handle_frame(&mut self.user, frame);
    }

    /// Fire every reply timeout due at `now`.
    pub fn expire(&mut self, now: Instant) -> usize {
        self.connections
            .iter_mut()
            .map(|c| c.expire_pending(&mut self.user, now))
            .sum()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.connections.iter().filter_map(Connection::next_deadline).min()
    }

    /// Remove the connection through the API. On success it stops receiving frames,
    /// its pending replies are dropped, and its dialogs disappear.
    pub async fn remove_connection(
        &mut self,
        api: &impl ConnectionApi,
        connection_id: &str,
    ) -> Result<()> {
        api.remove_connection(connection_id).await?;
        if let Some(idx) = self
            .connections
            .iter()
            .position(|c| c.connection_id == connection_id)
        {
            let mut conn = self.connections.remove(idx);
            let dropped = conn.clear_pending();
            tracing::info!(connection_id, dropped, "connection removed");
        }
        self.user.remove_dialogs(|d| d.connection_id == connection_id);
        Ok(())
    }

    /// Update the connection when `connection_id` is given, create it otherwise.
    pub async fn save_connection(
        &mut self,
        api: &impl ConnectionApi,
        connection_id: Option<&str>,
        attrs: &ConnectionUpdate,
    ) -> Result<&mut Connection> {
        let info = match connection_id {
            Some(id) => api.update_connection(id, attrs).await?,
            None => api.create_connection(attrs).await?,
        };
        Ok(self.ensure_connection(info))
    }

    pub async fn rooms(
        &self,
        api: &impl ConnectionApi,
        connection_id: &str,
        pattern: &str,
    ) -> Result<RoomList> {
        if self.connection(connection_id).is_none() {
            return Err(ClientError::UnknownConnection(connection_id.to_string()));
        }
        api.rooms(connection_id, pattern).await
    }

    /// Drive the client until `input` yields [`Input::Shutdown`] or either channel closes.
    /// Returns the client so its final state can be inspected or persisted.
    pub async fn run(
        mut self,
        mut frames: mpsc::Receiver<Frame>,
        mut input: mpsc::Receiver<Input>,
    ) -> Self {
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => self.handle_frame(frame),
                    None => break,
                },
                cmd = input.recv() => match cmd {
                    Some(Input::Send { connection_id, text, dialog_id }) => {
                        if let Err(e) = self.send(&connection_id, &text, dialog_id.as_deref()) {
                            tracing::warn!("dropping input: {e}");
                        }
                    }
                    Some(Input::Shutdown) | None => break,
                },
                _ = sleep_until(deadline) => {
                    self.expire(Instant::now());
                }
            }
        }
        tracing::debug!(pending = self.connections.iter().map(Connection::pending_replies).sum::<usize>(), "client loop stopped");
        self
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
