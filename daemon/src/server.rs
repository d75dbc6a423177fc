//! TCP server loop
//!
//! One connection is served at a time: accept, run its command loop to
//! completion, loop back to accept. `exit` stops accepting and terminates
//! the loop.

use crate::config::Config;
use crate::probe::ProbeRegistry;
use crate::session::{self, SessionEnd};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

pub struct Server {
    listener: TcpListener,
    registry: ProbeRegistry,
}

impl Server {
    /// Bind with the builtin probe set.
    pub async fn bind(config: Config) -> Result<Server> {
        Self::bind_with_registry(config, ProbeRegistry::with_builtins()).await
    }

    /// Bind with a caller-supplied probe registry (external probe crates
    /// register their constructors before handing the registry over).
    pub async fn bind_with_registry(config: Config, registry: ProbeRegistry) -> Result<Server> {
        config.validate().context("Invalid configuration")?;
        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.listen_addr))?;
        info!("listening on {}", listener.local_addr()?);
        Ok(Server { listener, registry })
    }

    /// The bound address (useful when the config asked for port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }

    /// Accept and serve connections until `exit`.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await.context("accept failed")?;
            info!(%peer, "client connected");

            match session::handle_connection(stream, &self.registry).await {
                Ok(SessionEnd::Disconnected) => debug!(%peer, "client disconnected"),
                Ok(SessionEnd::Exit) => {
                    info!("shutting down");
                    break;
                }
                Err(e) => warn!(%peer, "session failed: {:#}", e),
            }
        }
        Ok(())
    }
}
