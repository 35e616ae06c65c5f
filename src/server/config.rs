//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::*;
use crate::session::SessionConfig;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Largest fragment read from a connection at a time
    pub read_buffer_size: usize,

    /// Bound on a reassembled logical message
    pub max_message_size: usize,

    /// Hard cap enforced by the WebSocket layer itself
    pub transport_max_message_size: usize,

    /// Outbound queue depth per connection
    pub outbound_queue_capacity: usize,

    /// Wait for outbound queue space before a send fails
    pub send_timeout: Duration,

    /// Bound on the close handshake
    pub close_timeout: Duration,

    /// How long shutdown waits for sessions to finish
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            max_connections: 0, // Unlimited
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            transport_max_message_size: DEFAULT_TRANSPORT_MAX_MESSAGE_SIZE,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
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

    /// Set the logical message bound
    ///
    /// The transport cap is raised to match if it would otherwise reject
    /// messages this bound allows.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size.max(1);
        self.transport_max_message_size = self.transport_max_message_size.max(self.max_message_size);
        self
    }

    /// Set the fragment read size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set the outbound queue depth
    pub fn outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity.max(1);
        self
    }

    /// Set the send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the close handshake timeout
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Limits handed to each session
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_message_size: self.max_message_size,
            read_buffer_size: self.read_buffer_size,
            send_timeout: self.send_timeout,
            close_timeout: self.close_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.read_buffer_size, 64 * 1024);
        assert_eq!(config.max_message_size, 1024 * 1024);
        assert_eq!(config.transport_max_message_size, 16 * 1024 * 1024);
        assert_eq!(config.outbound_queue_capacity, 64);
        assert_eq!(config.close_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9090);
    }

    #[test]
    fn test_builder_max_message_size_raises_transport_cap() {
        let config = ServerConfig::default().max_message_size(32 * 1024 * 1024);

        assert_eq!(config.max_message_size, 32 * 1024 * 1024);
        assert_eq!(config.transport_max_message_size, 32 * 1024 * 1024);

        let config = ServerConfig::default().max_message_size(1024);
        assert_eq!(config.transport_max_message_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_builder_zero_sizes_clamped() {
        let config = ServerConfig::default()
            .read_buffer_size(0)
            .outbound_queue_capacity(0);

        assert_eq!(config.read_buffer_size, 1);
        assert_eq!(config.outbound_queue_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .send_timeout(Duration::from_secs(1))
            .close_timeout(Duration::from_secs(2))
            .shutdown_timeout(Duration::from_secs(3));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.send_timeout, Duration::from_secs(1));
        assert_eq!(config.close_timeout, Duration::from_secs(2));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_session_config_follows_server_config() {
        let config = ServerConfig::default()
            .max_message_size(2048)
            .read_buffer_size(512)
            .close_timeout(Duration::from_millis(500));
        let session = config.session_config();

        assert_eq!(session.max_message_size, 2048);
        assert_eq!(session.read_buffer_size, 512);
        assert_eq!(session.close_timeout, Duration::from_millis(500));
    }
}
