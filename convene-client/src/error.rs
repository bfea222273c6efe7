//! Error type for the client library.

/// Errors surfaced to callers of the library.
///
/// Protocol failures (timeouts, server-reported `errors`, dispatch failures inside
/// [`Connection::send`](crate::Connection::send)) are folded into dialogs as `error`
/// messages instead; these variants cover the outer surfaces.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The transport refused the outbound message.
    #[error("transport closed")]
    TransportClosed,

    /// No connection with this id is known to the client.
    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    /// The HTTP API answered with an error.
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("invalid api url: {0}")]
    Url(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("bad config: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
