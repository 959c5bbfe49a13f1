//! Server configuration.

use std::time::Duration;

use parley_transport::DEFAULT_MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};

/// Port the server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 9999;

/// Distance between a client's request port and its callback port.
pub const DEFAULT_CALLBACK_PORT_OFFSET: u16 = 100;

/// Runtime settings for a [`ParleyServer`](crate::ParleyServer).
///
/// Every field has a default, so a config file only needs the keys it
/// wants to change:
///
/// ```rust
/// use parley::ServerConfig;
///
/// let config: ServerConfig = serde_json::from_str(r#"{ "callback_port_offset": 7 }"#).unwrap();
/// assert_eq!(config.callback_port_offset, 7);
/// assert_eq!(config.bind_addr, "0.0.0.0:9999");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the accept loop binds to.
    pub bind_addr: String,

    /// Added to a client's source port to find its callback listener.
    pub callback_port_offset: u16,

    /// How long a connection may sit idle between requests. Also bounds
    /// writing a reply.
    pub read_timeout_ms: u64,

    /// Bound on each outbound connect and each outbound write.
    pub push_timeout_ms: u64,

    /// Longest request line accepted, newline included.
    pub max_frame_len: usize,

    /// Outbound pushes allowed in flight at once, across all deliveries.
    pub fanout_concurrency: usize,

    /// Sent to every connected user in the shutdown `DISCONNECT`.
    pub shutdown_reason: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            callback_port_offset: DEFAULT_CALLBACK_PORT_OFFSET,
            read_timeout_ms: 5_000,
            push_timeout_ms: 5_000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            fanout_concurrency: 32,
            shutdown_reason: "server shutting down".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}
