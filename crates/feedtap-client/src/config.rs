//! Client configuration.

use std::time::Duration;

use feedtap_proto::DEFAULT_PORT;

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default timeout for establishing the connection and handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server hostname.
    pub host: String,

    /// Driver port.
    pub port: u16,

    /// Auth key sent during the handshake; empty when the server has none.
    pub auth_key: String,

    /// Timeout for connecting and completing the handshake.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration for the given host on the default port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            auth_key: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Create a configuration for localhost on the default port.
    pub fn localhost() -> Self {
        Self::new(DEFAULT_HOST)
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the auth key.
    pub fn with_auth_key(mut self, auth_key: impl Into<String>) -> Self {
        self.auth_key = auth_key.into();
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `host:port` form used in logs.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::localhost()
    }
}
