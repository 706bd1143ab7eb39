//! Drains the ingestion queue into the broadcast hub.

use crate::hub::BroadcastHub;
use crate::queue::IngestionQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Events handed to the hub between cooperative yields.
const YIELD_EVERY: u64 = 64;

/// Move events from the queue to the hub until cancelled.
///
/// Backs off for `backoff` whenever the queue is empty. Returns the number
/// of events taken.
pub(crate) async fn run_broadcast_loop(
    queue: Arc<IngestionQueue>,
    hub: Arc<BroadcastHub>,
    backoff: Duration,
    cancel: CancellationToken,
) -> u64 {
    info!(backoff_ms = backoff.as_millis() as u64, "Broadcast loop started");
    let mut taken = 0u64;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match queue.try_take() {
            Some(event) => {
                hub.broadcast(&event);
                taken += 1;
                if taken % YIELD_EVERY == 0 {
                    tokio::task::yield_now().await;
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }

    debug!(taken, left = queue.len(), "Broadcast loop stopped");
    taken
}

#[cfg(test)]
mod tests {
    use super::*;
    use taglink_core::{Identity, ObservedAt, TagEvent};

    fn event(code: &str) -> TagEvent {
        TagEvent {
            identity: Identity::new(code),
            name: None,
            antenna: Some(2),
            signal_strength: Some(-45.0),
            observed_at: ObservedAt::from_micros(1_700_000_000_000_000).unwrap(),
            seen_count: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_delivers_in_order_then_stops() {
        let queue = Arc::new(IngestionQueue::default());
        let hub = Arc::new(BroadcastHub::default());
        let mut subscription = hub.register("test").unwrap();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_broadcast_loop(
            queue.clone(),
            hub.clone(),
            Duration::from_millis(100),
            cancel.clone(),
        ));

        for code in ["A", "B", "C"] {
            queue.push(event(code));
        }

        for expected in ["A", "B", "C"] {
            let frame = subscription.recv().await.unwrap();
            assert_eq!(frame.identity, expected);
        }

        cancel.cancel();
        assert_eq!(task.await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_backs_off() {
        let queue = Arc::new(IngestionQueue::default());
        let hub = Arc::new(BroadcastHub::default());
        let mut subscription = hub.register("test").unwrap();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_broadcast_loop(
            queue.clone(),
            hub.clone(),
            Duration::from_millis(100),
            cancel.clone(),
        ));

        // Let the loop find the queue empty and go to sleep
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(event("late"));

        let started = tokio::time::Instant::now();
        let frame = subscription.recv().await.unwrap();
        assert_eq!(frame.identity, "late");
        assert!(started.elapsed() <= Duration::from_millis(100));

        cancel.cancel();
        task.await.unwrap();
    }
}
