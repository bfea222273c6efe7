//! Client session tests: event loop, server pushes, connection management.
//!
//! Tests cover:
//! - `Client::run` driving reply timeouts with paused tokio time
//! - Replies arriving through the loop before the deadline
//! - Push events (connection state, me) routed through frames
//! - remove / save / rooms against an in-memory API

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use convene_client::api::{ConnectionApi, ConnectionInfo, Room, RoomList};
use convene_client::config::ClientConfig;
use convene_client::connection::ConnectionUpdate;
use convene_client::message::kind;
use convene_client::user::ChannelTransport;
use convene_client::{Client, ClientError, ConnectionState, Frame, Input, Message, User};

const CONN: &str = "irc-libera";

fn client() -> (Client, mpsc::UnboundedReceiver<convene_client::OutboundMessage>) {
    let (transport, rx) = ChannelTransport::pair();
    let mut client = Client::new(User::new(transport), &ClientConfig::default());
    client.ensure_connection(ConnectionInfo {
        connection_id: CONN.into(),
        ..Default::default()
    });
    (client, rx)
}

fn push(kind: &str) -> Message {
    Message {
        connection_id: CONN.into(),
        kind: Some(kind.into()),
        ..Default::default()
    }
}

fn send(text: &str) -> Input {
    Input::Send {
        connection_id: CONN.into(),
        text: text.into(),
        dialog_id: None,
    }
}

#[tokio::test(start_paused = true)]
async fn run_loop_times_out_unanswered_command() {
    let (client, mut outbound) = client();
    let (_frame_tx, frame_rx) = mpsc::channel(16);
    let (input_tx, input_rx) = mpsc::channel(16);
    let handle = tokio::spawn(client.run(frame_rx, input_rx));

    input_tx.send(send("/whois alice")).await.unwrap();
    let out = outbound.recv().await.unwrap();
    assert_eq!(out.message, "/whois alice");

    tokio::time::sleep(Duration::from_secs(6)).await;
    input_tx.send(Input::Shutdown).await.unwrap();
    let client = handle.await.unwrap();

    let status = client.user().find(CONN, "").unwrap();
    let errors: Vec<_> = status
        .messages
        .iter()
        .filter(|m| m.kind() == kind::ERROR)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].text(), "No response on \"/whois alice\".");
    assert_eq!(client.connection(CONN).unwrap().pending_replies(), 0);
}

#[tokio::test(start_paused = true)]
async fn run_loop_reply_wins_over_timeout() {
    let (client, mut outbound) = client();
    let (frame_tx, frame_rx) = mpsc::channel(16);
    let (input_tx, input_rx) = mpsc::channel(16);
    let handle = tokio::spawn(client.run(frame_rx, input_rx));

    input_tx.send(send("/j #rust")).await.unwrap();
    let out = outbound.recv().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    frame_tx
        .send(Frame::Sent(Message {
            id: Some(out.id),
            connection_id: CONN.into(),
            dialog_id: Some("#rust".into()),
            ..Default::default()
        }))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    input_tx.send(Input::Shutdown).await.unwrap();
    let client = handle.await.unwrap();

    assert_eq!(
        client.user().active_dialog().map(|d| d.dialog_id.as_str()),
        Some("#rust")
    );
    let any_error = client
        .user()
        .dialogs()
        .iter()
        .flat_map(|d| d.messages.iter())
        .any(|m| m.kind() == kind::ERROR);
    assert!(!any_error);
}

#[tokio::test(start_paused = true)]
async fn run_loop_stops_when_frames_close() {
    let (client, _outbound) = client();
    let (frame_tx, frame_rx) = mpsc::channel(16);
    let (_input_tx, input_rx) = mpsc::channel(16);
    let handle = tokio::spawn(client.run(frame_rx, input_rx));

    let mut me = push("me");
    me.nick = Some("alice".into());
    frame_tx.send(Frame::State(me)).await.unwrap();
    let mut me = push("me");
    me.nick = Some("bob".into());
    frame_tx.send(Frame::State(me)).await.unwrap();
    drop(frame_tx);

    let client = handle.await.unwrap();
    let conn = client.connection(CONN).unwrap();
    assert_eq!(conn.me.nick, "bob");
    let notices: Vec<_> = client
        .user()
        .find(CONN, "")
        .unwrap()
        .messages
        .iter()
        .filter(|m| m.text().starts_with("You changed nick"))
        .map(|m| m.text().to_string())
        .collect();
    assert_eq!(notices, vec!["You changed nick to bob."]);
}

#[test]
fn connection_push_sets_state_and_frozen_reason() {
    let (mut client, _rx) = client();
    let mut down = push("connection");
    down.state = Some("disconnected".into());
    down.message = Some("timeout".into());
    client.handle_frame(Frame::State(down));
    assert_eq!(client.connection(CONN).unwrap().state, ConnectionState::Disconnected);
    assert_eq!(client.user().find(CONN, "").unwrap().frozen, "timeout");

    let mut up = push("connection");
    up.state = Some("connected".into());
    client.handle_frame(Frame::State(up));
    assert_eq!(client.connection(CONN).unwrap().state, ConnectionState::Connected);
    assert_eq!(client.user().find(CONN, "").unwrap().frozen, "");
}

#[derive(Default)]
struct MemoryApi {
    connections: Mutex<Vec<ConnectionInfo>>,
    removed: Mutex<Vec<String>>,
    fail_remove: bool,
}

impl ConnectionApi for MemoryApi {
    async fn create_connection(
        &self,
        attrs: &ConnectionUpdate,
    ) -> Result<ConnectionInfo, ClientError> {
        let mut connections = self.connections.lock().unwrap();
        let info = ConnectionInfo {
            connection_id: format!("irc-{}", connections.len() + 1),
            attrs: attrs.clone(),
        };
        connections.push(info.clone());
        Ok(info)
    }

    async fn update_connection(
        &self,
        connection_id: &str,
        attrs: &ConnectionUpdate,
    ) -> Result<ConnectionInfo, ClientError> {
        Ok(ConnectionInfo {
            connection_id: connection_id.to_string(),
            attrs: attrs.clone(),
        })
    }

    async fn remove_connection(&self, connection_id: &str) -> Result<(), ClientError> {
        if self.fail_remove {
            return Err(ClientError::Api {
                status: 500,
                message: "nope".into(),
            });
        }
        self.removed.lock().unwrap().push(connection_id.to_string());
        Ok(())
    }

    async fn rooms(&self, _connection_id: &str, pattern: &str) -> Result<RoomList, ClientError> {
        Ok(RoomList {
            rooms: vec![Room {
                dialog_id: format!("#{pattern}"),
                name: format!("#{pattern}"),
                topic: String::new(),
                n_users: 3,
            }],
            end: true,
        })
    }
}

#[tokio::test]
async fn remove_connection_drops_dialogs_and_frames() {
    let (mut client, mut rx) = client();
    client.user_mut().ensure_dialog(&Message {
        connection_id: CONN.into(),
        dialog_id: Some("#rust".into()),
        ..Default::default()
    });
    client.send(CONN, "/names", Some("#rust")).unwrap();
    let out = rx.try_recv().unwrap();

    let api = MemoryApi::default();
    client.remove_connection(&api, CONN).await.unwrap();
    assert_eq!(*api.removed.lock().unwrap(), vec![CONN.to_string()]);
    assert!(client.connection(CONN).is_none());
    assert!(client.user().dialogs().is_empty());
    assert!(client.next_deadline().is_none());

    // Late reply and pushes for the removed connection are no-ops.
    client.handle_frame(Frame::Sent(Message {
        id: Some(out.id),
        connection_id: CONN.into(),
        dialog_id: Some("#rust".into()),
        ..Default::default()
    }));
    client.handle_frame(Frame::State(push("topic")));
    assert!(client.user().dialogs().is_empty());
}

#[tokio::test]
async fn failed_remove_keeps_connection() {
    let (mut client, _rx) = client();
    let api = MemoryApi {
        fail_remove: true,
        ..Default::default()
    };
    let err = client.remove_connection(&api, CONN).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 500, .. }));
    assert!(client.connection(CONN).is_some());
    assert!(client.user().find(CONN, "").is_some());
}

#[tokio::test]
async fn save_creates_then_updates() {
    let (mut client, _rx) = client();
    let api = MemoryApi::default();
    let attrs = ConnectionUpdate {
        name: Some("OFTC".into()),
        url: Some("irc://irc.oftc.net:6697".into()),
        ..Default::default()
    };
    let id = client
        .save_connection(&api, None, &attrs)
        .await
        .unwrap()
        .connection_id
        .clone();
    assert_eq!(id, "irc-1");
    assert_eq!(client.connections().len(), 2);
    assert_eq!(client.connection("irc-1").unwrap().url, "irc://irc.oftc.net:6697");

    let rename = ConnectionUpdate {
        name: Some("OFTC (tls)".into()),
        wanted_state: Some(ConnectionState::Disconnected),
        ..Default::default()
    };
    let conn = client.save_connection(&api, Some("irc-1"), &rename).await.unwrap();
    assert_eq!(conn.name, "OFTC (tls)");
    assert_eq!(conn.wanted_state, ConnectionState::Disconnected);
    assert_eq!(client.connections().len(), 2);
}

#[tokio::test]
async fn rooms_requires_known_connection() {
    let (client, _rx) = client();
    let api = MemoryApi::default();
    let list = client.rooms(&api, CONN, "rust").await.unwrap();
    assert_eq!(list.rooms[0].dialog_id, "#rust");
    assert!(list.end);

    let err = client.rooms(&api, "irc-nope", "rust").await.unwrap_err();
    assert!(matches!(err, ClientError::UnknownConnection(_)));
}
