//! Connection core for a multi-network chat client.
//!
//! One [`Connection`] per (user, network). Each connection:
//! - turns slash-commands typed by the user into `send` requests ([`connection::router`])
//! - correlates the backend's replies with those requests, with a timeout ([`connection::replies`])
//! - folds unsolicited server pushes into connection and dialog state ([`connection::state`])
//!
//! The [`Client`] owns the [`User`] (dialog collection + active view), every connection,
//! the alias table and the message id source, and drives the whole thing from one task.

pub mod api;
pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod dialog;
pub mod error;
pub mod ids;
pub mod message;
pub mod user;

pub use client::{Client, Input};
pub use commands::{AliasTable, CommandSpec};
pub use connection::{Connection, ConnectionState};
pub use dialog::{Dialog, DialogKey};
pub use error::ClientError;
pub use ids::MessageIds;
pub use message::{Frame, Message, OutboundMessage};
pub use user::{Transport, User};
