//! One subscriber connection.

use crate::error::{Result, TransportError};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use taglink_pipeline::{BroadcastHub, Subscription};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the connection.
    PeerClosed,
    /// The hub pruned the subscriber.
    Pruned,
    /// The server is shutting down.
    Shutdown,
}

/// Pump frames from `subscription` to the peer as JSON lines until the
/// peer leaves, the hub drops the subscriber or `cancel` fires.
///
/// Inbound lines are read and discarded; reading them is what detects a
/// peer that went away.
pub(crate) async fn serve_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    mut subscription: Subscription,
    hub: Arc<BroadcastHub>,
    max_line_length: usize,
    cancel: CancellationToken,
) {
    let id = subscription.id();
    let started = Instant::now();
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(max_line_length));

    let outcome = pump(&mut framed, &mut subscription, &cancel).await;

    subscription.mark_dead();
    hub.unregister(id);

    match outcome {
        Ok((end, sent)) => info!(
            subscriber_id = %id,
            peer = %peer,
            ?end,
            sent,
            duration_ms = started.elapsed().as_millis() as u64,
            "Subscriber session closed"
        ),
        Err(e) => warn!(
            subscriber_id = %id,
            peer = %peer,
            error = %e,
            duration_ms = started.elapsed().as_millis() as u64,
            "Subscriber session failed"
        ),
    }
}

async fn pump(
    framed: &mut Framed<TcpStream, LinesCodec>,
    subscription: &mut Subscription,
    cancel: &CancellationToken,
) -> Result<(SessionEnd, u64)> {
    let mut sent = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok((SessionEnd::Shutdown, sent)),

            frame = subscription.recv() => {
                let Some(frame) = frame else {
                    return Ok((SessionEnd::Pruned, sent));
                };
                let line = serde_json::to_string(frame.as_ref())?;
                framed.send(line).await.map_err(TransportError::from)?;
                sent += 1;
                trace!(subscriber_id = %subscription.id(), identity = %frame.identity, "Frame sent");
            }

            inbound = framed.next() => match inbound {
                Some(Ok(line)) => {
                    debug!(subscriber_id = %subscription.id(), len = line.len(), "Ignoring inbound line");
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok((SessionEnd::PeerClosed, sent)),
            },
        }
    }
}
