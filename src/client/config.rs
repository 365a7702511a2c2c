//! Client configuration

use std::time::Duration;

use crate::broker::config::DEFAULT_POLL_TIMEOUT;
use crate::protocol::DEFAULT_MAX_RESPONSE_SIZE;
use crate::server::config::DEFAULT_PORT;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address (`host:port`)
    pub addr: String,

    /// Timeout for establishing the TCP connection
    pub connect_timeout: Duration,

    /// Slack added to every request deadline on top of the poll timeout
    pub request_margin: Duration,

    /// Poll timeout the server applies when a poll asks for its default
    ///
    /// Only used to size the local deadline of polls with a non-positive
    /// timeout; set it to match the server's broker configuration.
    pub server_poll_timeout: Duration,

    /// Maximum response line length
    ///
    /// Poll responses carry whole batches, so this is far larger than the
    /// server's request line limit.
    pub max_frame_size: usize,

    /// Enable TCP_NODELAY
    pub tcp_nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            connect_timeout: Duration::from_secs(10),
            request_margin: Duration::from_secs(5),
            server_poll_timeout: DEFAULT_POLL_TIMEOUT,
            max_frame_size: DEFAULT_MAX_RESPONSE_SIZE,
            tcp_nodelay: true,
        }
    }
}

impl ClientConfig {
    /// Create a config for the given server address
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the slack added to request deadlines
    pub fn request_margin(mut self, margin: Duration) -> Self {
        self.request_margin = margin;
        self
    }

    /// Set the server's default poll timeout
    pub fn server_poll_timeout(mut self, timeout: Duration) -> Self {
        self.server_poll_timeout = timeout;
        self
    }

    /// Set maximum response frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.max(1);
        self
    }
}
