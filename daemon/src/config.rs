//! Daemon configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen address for the command socket
    pub listen_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: std::env::var("PERISCOPE_LISTEN")
                .unwrap_or_else(|_| "127.0.0.1:7070".to_string()),
        }
    }
}

impl Config {
    /// Listen on the given port on loopback.
    pub fn with_port(port: u16) -> Self {
        Self {
            listen_addr: format!("127.0.0.1:{}", port),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        use std::net::ToSocketAddrs;

        if self
            .listen_addr
            .to_socket_addrs()
            .map(|mut addrs| addrs.next().is_none())
            .unwrap_or(true)
        {
            anyhow::bail!("Invalid listen address: {}", self.listen_addr);
        }

        Ok(())
    }
}
