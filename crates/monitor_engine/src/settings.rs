use std::path::PathBuf;
use std::time::Duration;

use monitor_core::{BackoffPolicy, ConnectionConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

impl SetupError {
    fn address(address: &str, reason: impl ToString) -> Self {
        SetupError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Connection and history settings for the monitor client.
///
/// Every field has a default, so a config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Base address of the backend; relative paths resolve against it.
    pub base_url: String,
    /// Socket endpoint, either relative to `base_url` or an absolute `ws://`/`wss://` address.
    pub socket_path: String,
    pub health_path: String,
    pub probe_attempts: u32,
    pub probe_base_ms: u64,
    pub probe_cap_ms: u64,
    pub probe_timeout_ms: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_cap_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub rebuild_debounce_ms: u64,
    pub live_capacity: usize,
    pub durable_capacity: usize,
    /// JSON history file; history is kept in memory only when unset.
    pub history_path: Option<PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            socket_path: "/ws".to_string(),
            health_path: "/health".to_string(),
            probe_attempts: 5,
            probe_base_ms: 500,
            probe_cap_ms: 5_000,
            probe_timeout_ms: 2_000,
            reconnect_base_ms: 500,
            reconnect_cap_ms: 15_000,
            heartbeat_interval_ms: 15_000,
            rebuild_debounce_ms: 5_000,
            live_capacity: crate::buffer::DEFAULT_LIVE_CAPACITY,
            durable_capacity: crate::buffer::DEFAULT_DURABLE_CAPACITY,
            history_path: None,
        }
    }
}

impl ClientSettings {
    pub fn socket_url(&self) -> Result<Url, SetupError> {
        let mut url = self.resolve(&self.socket_path)?;
        let scheme = match url.scheme() {
            "ws" | "wss" => return Ok(url),
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(SetupError::address(
                    &self.socket_path,
                    format!("unsupported scheme {other}"),
                ))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| SetupError::address(&self.socket_path, "cannot switch to socket scheme"))?;
        Ok(url)
    }

    pub fn health_url(&self) -> Result<Url, SetupError> {
        self.resolve(&self.health_path)
    }

    pub fn probe_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.probe_base_ms),
            Duration::from_millis(self.probe_cap_ms),
        )
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            reconnect: BackoffPolicy::new(
                Duration::from_millis(self.reconnect_base_ms),
                Duration::from_millis(self.reconnect_cap_ms),
            ),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms.max(1)),
        }
    }

    pub fn rebuild_debounce(&self) -> Duration {
        Duration::from_millis(self.rebuild_debounce_ms)
    }

    fn resolve(&self, address: &str) -> Result<Url, SetupError> {
        match Url::parse(address) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base =
                    Url::parse(&self.base_url).map_err(|e| SetupError::address(&self.base_url, e))?;
                base.join(address).map_err(|e| SetupError::address(address, e))
            }
            Err(err) => Err(SetupError::address(address, err)),
        }
    }
}
