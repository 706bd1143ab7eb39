//! Hand-off between ingest workers and the broadcast loop.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use taglink_core::TagEvent;
use taglink_core::constants::DEFAULT_QUEUE_CAPACITY;
use tracing::warn;

/// Bounded FIFO of normalized events.
///
/// `push` never blocks: when the queue is full the oldest event is dropped
/// and counted. `try_take` never blocks either; the consumer decides how to
/// wait.
///
/// # Examples
///
/// ```
/// use taglink_core::{Identity, ObservedAt, TagEvent};
/// use taglink_pipeline::IngestionQueue;
///
/// let event = |code: &str| TagEvent {
///     identity: Identity::new(code),
///     name: None,
///     antenna: Some(1),
///     signal_strength: None,
///     observed_at: ObservedAt::now(),
///     seen_count: 1,
/// };
///
/// let queue = IngestionQueue::new(2);
/// queue.push(event("A"));
/// queue.push(event("B"));
/// queue.push(event("C"));
///
/// assert_eq!(queue.dropped(), 1);
/// assert_eq!(queue.try_take().unwrap().identity, Identity::new("B"));
/// ```
#[derive(Debug)]
pub struct IngestionQueue {
    events: Mutex<VecDeque<TagEvent>>,
    capacity: usize,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl IngestionQueue {
    /// Create a queue holding at most `capacity` events (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append an event, evicting the oldest one when full.
    ///
    /// Returns the evicted event, if any.
    pub fn push(&self, event: TagEvent) -> Option<TagEvent> {
        let evicted = {
            let mut events = self.events.lock();
            let evicted = if events.len() >= self.capacity {
                events.pop_front()
            } else {
                None
            };
            events.push_back(event);
            evicted
        };

        self.pushed.fetch_add(1, Ordering::Relaxed);
        if let Some(old) = &evicted {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                identity = %old.identity,
                dropped,
                capacity = self.capacity,
                "Ingestion queue full, dropping oldest event"
            );
        }
        evicted
    }

    /// Take the oldest event, if any.
    pub fn try_take(&self) -> Option<TagEvent> {
        self.events.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events accepted since creation.
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Events evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for IngestionQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use taglink_core::{Identity, ObservedAt};

    fn event(code: &str) -> TagEvent {
        TagEvent {
            identity: Identity::new(code),
            name: None,
            antenna: None,
            signal_strength: None,
            observed_at: ObservedAt::from_micros(0).unwrap(),
            seen_count: 1,
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = IngestionQueue::default();
        for code in ["A", "B", "C"] {
            assert!(queue.push(event(code)).is_none());
        }

        let taken: Vec<_> = std::iter::from_fn(|| queue.try_take())
            .map(|e| e.identity.to_string())
            .collect();
        assert_eq!(taken, vec!["A", "B", "C"]);
        assert!(queue.is_empty());
        assert_eq!(queue.pushed(), 3);
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let queue = IngestionQueue::new(3);
        for code in ["A", "B", "C", "D", "E"] {
            queue.push(event(code));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.try_take().unwrap().identity, Identity::new("C"));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = IngestionQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(event("A"));
        let evicted = queue.push(event("B"));
        assert_eq!(evicted.unwrap().identity, Identity::new("A"));
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let queue = Arc::new(IngestionQueue::new(100_000));
        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                for i in 0..1000 {
                    queue.push(event(&format!("E{i:04}")));
                }
            })
        };

        let mut seen = Vec::new();
        while seen.len() < 1000 {
            if let Some(e) = queue.try_take() {
                seen.push(e.identity.to_string());
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();

        let expected: Vec<_> = (0..1000).map(|i| format!("E{i:04}")).collect();
        assert_eq!(seen, expected);
        assert_eq!(queue.dropped(), 0);
    }
}
