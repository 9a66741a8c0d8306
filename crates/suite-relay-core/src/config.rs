//! Controller configuration.

use std::{
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::SyncPolicy;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Coordination server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: IpAddr,
    /// HTTP port; `0` picks an ephemeral port.
    pub port: u16,
    /// WebSocket port; the HTTP router also serves `/ws` when equal to `port`.
    pub socket_port: u16,
    /// Whether acknowledgements wait for listeners.
    pub run_in_sync: SyncPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 9000,
            socket_port: 9001,
            run_in_sync: SyncPolicy::Never,
        }
    }
}

/// Remote capabilities relevant to the relay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Seconds of inactivity after which the remote reaps the session.
    #[serde(
        default,
        rename = "idle-timeout",
        skip_serializing_if = "Option::is_none"
    )]
    pub idle_timeout: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Settings for running a suite inside a remote browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Public URL of the coordination server as seen by the remote browser.
    pub proxy_url: String,
    /// Directory the proxy serves as its root.
    pub base_path: PathBuf,
    /// Name of the local suite standing in for the remote root suite.
    pub name: String,
    pub capabilities: Capabilities,
    /// Reporter descriptor for the client page; non-objects select the default.
    pub runner_client_reporter: Option<Value>,
    /// Extra run arguments passed through to the client page.
    pub args: Map<String, Value>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_url: "http://localhost:9000/".to_string(),
            base_path: PathBuf::from("."),
            name: "unit tests".to_string(),
            capabilities: Capabilities::default(),
            runner_client_reporter: None,
            args: Map::new(),
        }
    }
}

/// Full controller configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

impl RelayConfig {
    /// Parse configuration from JSON text.
    ///
    /// # Errors
    /// Returns error if the JSON does not describe a valid configuration.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}
