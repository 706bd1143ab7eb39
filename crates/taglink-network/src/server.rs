//! TCP subscriber server.
//!
//! Every accepted connection becomes one hub subscriber and receives each
//! broadcast event as a single line of JSON.
//!
//! # Architecture
//!
//! ```text
//! listener ──accept──► BroadcastHub::register ──► session task
//!                                                  ├── outbox ──► JSON line ──► peer
//!                                                  └── peer lines (ignored, EOF ends the session)
//! ```
//!
//! Connections above the hub's subscriber limit are closed immediately.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taglink_network::{SubscriberServer, TransportConfig};
//! use taglink_pipeline::BroadcastHub;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> taglink_network::Result<()> {
//! let hub = Arc::new(BroadcastHub::default());
//! let server = SubscriberServer::bind(TransportConfig::default(), hub).await?;
//!
//! let cancel = CancellationToken::new();
//! server.run(cancel).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, TransportError};
use crate::session::serve_subscriber;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use taglink_pipeline::BroadcastHub;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default subscriber port.
pub const DEFAULT_TRANSPORT_PORT: u16 = 8765;

/// Default cap on inbound line length.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024;

/// Configuration for the subscriber server
///
/// # Example
///
/// ```
/// use taglink_network::TransportConfig;
///
/// let config = TransportConfig::default().bind_addr("127.0.0.1:9000".parse().unwrap());
/// assert_eq!(config.bind_addr.port(), 9000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,

    /// Longest inbound line accepted before the connection is dropped
    pub max_line_length: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_TRANSPORT_PORT)),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl TransportConfig {
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn max_line_length(mut self, length: usize) -> Self {
        self.max_line_length = length;
        self
    }
}

/// Accepts subscriber connections and registers them with the hub.
pub struct SubscriberServer {
    listener: TcpListener,
    hub: Arc<BroadcastHub>,
    config: TransportConfig,
}

impl SubscriberServer {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] if the address is in use or
    /// not permitted.
    pub async fn bind(config: TransportConfig, hub: Arc<BroadcastHub>) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| TransportError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;

        info!(
            "Subscriber server listening on {}",
            listener.local_addr().unwrap_or(config.bind_addr)
        );

        Ok(Self {
            listener,
            hub,
            config,
        })
    }

    /// Actual bound address (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Accept connections until `cancel` fires.
    ///
    /// Sessions get a child token, so cancelling also closes every open
    /// subscriber connection.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        // Per-connection failures (e.g. reset before accept) are not fatal
                        warn!(error = %e, "Accept failed");
                        continue;
                    }
                },
            };
            debug!("Accepted subscriber connection from {}", peer);

            let subscription = match self.hub.register(peer.to_string()) {
                Ok(subscription) => subscription,
                Err(e) => {
                    error!(peer = %peer, error = %e, "Subscriber rejected");
                    drop(stream);
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
            }

            tokio::spawn(serve_subscriber(
                stream,
                peer,
                subscription,
                self.hub.clone(),
                self.config.max_line_length,
                cancel.child_token(),
            ));
        }

        info!("Subscriber server stopped");
        Ok(())
    }

    /// Run on a background task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8765");
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let hub = Arc::new(BroadcastHub::default());
        let config = TransportConfig::default().bind_addr("127.0.0.1:0".parse().unwrap());
        let first = SubscriberServer::bind(config, hub.clone()).await.unwrap();

        let taken = TransportConfig::default().bind_addr(first.local_addr().unwrap());
        let err = SubscriberServer::bind(taken, hub).await.err().unwrap();
        assert!(matches!(err, TransportError::BindFailed { .. }));
    }
}
