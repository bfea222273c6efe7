//! Client configuration.
//!
//! Config file lives at `~/.config/convene/client.toml`. Every key is optional:
//!
//! ```toml
//! reply_timeout_ms = 5000
//! api_url = "http://localhost:3000/api"
//!
//! [[commands]]
//! command = "bs"
//! alias_for = "/msg BotServ"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::commands::{AliasTable, CommandSpec, builtin_registry};
use crate::connection::DEFAULT_REPLY_TIMEOUT;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    /// How long a sent command waits for its reply. Default: 5000.
    pub reply_timeout_ms: Option<u64>,
    /// Root of the HTTP API used for connection management.
    pub api_url: Option<String>,
    /// Extra registry entries, applied after the built-in ones.
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("convene")
        .join("client.toml")
}

impl ClientConfig {
    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)?;
        Self::from_toml(&s)
    }

    /// Like [`load`](Self::load) from the default path, falling back to defaults on error.
    pub fn load_or_default() -> Self {
        let path = default_path();
        match Self::load(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("bad config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REPLY_TIMEOUT)
    }

    /// Built-in registry followed by the configured entries.
    pub fn registry(&self) -> Vec<CommandSpec> {
        let mut registry = builtin_registry();
        registry.extend(self.commands.iter().cloned());
        registry
    }

    pub fn alias_table(&self) -> AliasTable {
        AliasTable::from_registry(&self.registry())
    }
}
