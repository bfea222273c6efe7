//! Connection management through the backend's HTTP API.
//!
//! The chat traffic itself goes over the [`Transport`](crate::Transport); this API only
//! creates, updates and removes connections and lists their rooms.

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionUpdate;
use crate::error::{ClientError, Result};
use crate::message::ApiError;

/// A connection as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub connection_id: String,
    #[serde(flatten)]
    pub attrs: ConnectionUpdate,
}

/// A room offered by the network, from [`ConnectionApi::rooms`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub dialog_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub n_users: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomList {
    #[serde(default)]
    pub rooms: Vec<Room>,
    /// `false` while the network is still sending its room list.
    #[serde(default)]
    pub end: bool,
}

#[allow(async_fn_in_trait)]
pub trait ConnectionApi {
    async fn create_connection(&self, attrs: &ConnectionUpdate) -> Result<ConnectionInfo>;
    async fn update_connection(
        &self,
        connection_id: &str,
        attrs: &ConnectionUpdate,
    ) -> Result<ConnectionInfo>;
    async fn remove_connection(&self, connection_id: &str) -> Result<()>;
    async fn rooms(&self, connection_id: &str, pattern: &str) -> Result<RoomList>;
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ApiError>,
}

/// [`ConnectionApi`] over HTTP (`reqwest`).
pub struct HttpApi {
    base: String,
    http: reqwest::Client,
}

impl HttpApi {
    /// `base` is the API root, e.g. `http://localhost:3000/api`.
    pub fn new(base: &str) -> Result<Self> {
        reqwest::Url::parse(base).map_err(|e| ClientError::Url(format!("{base}: {e}")))?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.errors.into_iter().next())
            .map(|e| e.message)
            .unwrap_or(body);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

impl ConnectionApi for HttpApi {
    async fn create_connection(&self, attrs: &ConnectionUpdate) -> Result<ConnectionInfo> {
        let resp = self.http.post(self.url("connections")).json(attrs).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn update_connection(
        &self,
        connection_id: &str,
        attrs: &ConnectionUpdate,
    ) -> Result<ConnectionInfo> {
        let resp = self
            .http
            .post(self.url(&format!("connection/{connection_id}")))
            .json(attrs)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn remove_connection(&self, connection_id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("connection/{connection_id}")))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn rooms(&self, connection_id: &str, pattern: &str) -> Result<RoomList> {
        let resp = self
            .http
            .get(self.url(&format!("connection/{connection_id}/rooms")))
            .query(&[("match", pattern)])
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}
