//! Network transport for taglink subscribers
//!
//! Live listeners connect over TCP and receive every broadcast tag event
//! as newline-delimited JSON. Each connection is one subscriber of the
//! pipeline's [`BroadcastHub`](taglink_pipeline::BroadcastHub).
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
//! let task = server.spawn(CancellationToken::new());
//! task.await.ok();
//! # Ok(())
//! # }
//! ```

pub mod error;
mod server;
mod session;

pub use error::{Result, TransportError};
pub use server::{DEFAULT_MAX_LINE_LENGTH, DEFAULT_TRANSPORT_PORT, SubscriberServer, TransportConfig};
pub use session::SessionEnd;
