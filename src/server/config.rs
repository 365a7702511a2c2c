//! Server configuration

use std::net::SocketAddr;

use crate::protocol::DEFAULT_MAX_FRAME_SIZE;

/// Default port the broker listens on
pub const DEFAULT_PORT: u16 = 12346;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Longest accepted request line in bytes
    pub max_frame_size: usize,

    /// Responses queued per connection before request handlers wait
    pub response_queue: usize,

    /// Leave every identity joined over a connection when it closes
    pub leave_on_disconnect: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            tcp_nodelay: true,  // Replies are small and latency-sensitive
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            response_queue: 64,
            leave_on_disconnect: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set maximum request line size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.max(1);
        self
    }

    /// Keep identities registered after their connection closes
    pub fn keep_identities_on_disconnect(mut self) -> Self {
        self.leave_on_disconnect = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 12346);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert!(config.tcp_nodelay);
        assert!(config.leave_on_disconnect);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 4000);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:12346".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .max_frame_size(0)
            .keep_identities_on_disconnect();

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.max_frame_size, 1);
        assert!(!config.leave_on_disconnect);
    }
}
