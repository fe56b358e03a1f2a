//! Konfigurasi server
//!
//! Semua nilai tetap selama server berjalan. Default mengikuti perilaku
//! klasik: backlog 5, poll timeout 3 detik, buffer terima 512 bytes.

use crate::error::{Result, ServerError};
use std::net::IpAddr;
use std::time::Duration;

/// Default listen backlog
pub const DEFAULT_BACKLOG: i32 = 5;
/// Default readiness poll timeout (also the worst-case shutdown latency without a waker)
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(3);
/// Default maximum bytes taken per read
pub const DEFAULT_RECV_CAPACITY: usize = 512;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen port (0 = ephemeral, see `TcpServer::local_addr`)
    pub port: u16,
    /// Kernel accept queue length
    pub backlog: i32,
    /// Upper bound for one readiness wait
    pub poll_timeout: Duration,
    /// Maximum bytes per read; each read becomes one message
    pub recv_capacity: usize,
    /// Bind address. `None` binds the wildcard address (IPv4 first, then IPv6)
    pub host: Option<IpAddr>,
    /// Set TCP_NODELAY on accepted connections
    pub nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            backlog: DEFAULT_BACKLOG,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            recv_capacity: DEFAULT_RECV_CAPACITY,
            host: None,
            nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Configuration with default values for the given port
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Set listen backlog
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Set readiness poll timeout
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set receive buffer capacity
    pub fn recv_capacity(mut self, capacity: usize) -> Self {
        self.recv_capacity = capacity;
        self
    }

    /// Bind a specific local address instead of the wildcard
    pub fn host(mut self, host: IpAddr) -> Self {
        self.host = Some(host);
        self
    }

    /// Enable or disable TCP_NODELAY on accepted connections
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.backlog <= 0 {
            return Err(ServerError::config(format!(
                "backlog must be positive, got {}",
                self.backlog
            )));
        }

        if self.recv_capacity == 0 {
            return Err(ServerError::config("recv_capacity must be non-zero"));
        }

        if self.poll_timeout.is_zero() {
            return Err(ServerError::config("poll_timeout must be non-zero"));
        }

        Ok(())
    }
}
