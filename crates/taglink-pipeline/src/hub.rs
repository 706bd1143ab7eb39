//! Subscriber registry and fan-out.
//!
//! Every live listener owns a [`Subscription`]: the receiving end of a
//! bounded outbox plus a liveness flag. The [`BroadcastHub`] keeps the
//! sending ends and delivers each event to every subscriber independently
//! with a non-blocking `try_send`.
//!
//! A subscriber whose outbox is closed or full, or whose liveness flag was
//! cleared, is pruned on the spot. One slow or dead listener never delays
//! the others.
//!
//! A broadcast pass iterates over a snapshot of the registry. A subscriber
//! registered during a pass may miss the in-flight event, and one removed
//! during a pass may still receive it.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use taglink_core::constants::DEFAULT_OUTBOX_CAPACITY;
use taglink_core::{EventFrame, TagEvent};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Default maximum number of concurrent subscribers.
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 1024;

/// Unique subscriber identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a delivery attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The receiving side is gone.
    Closed,
    /// The outbox is full; the listener is not keeping up.
    Full,
    /// The transport marked the subscriber as dead.
    NotAlive,
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "outbox closed"),
            Self::Full => write!(f, "outbox full"),
            Self::NotAlive => write!(f, "subscriber not alive"),
        }
    }
}

/// Hub-side view of one listener.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    label: String,
    outbox: mpsc::Sender<Arc<EventFrame>>,
    alive: Arc<AtomicBool>,
    connected_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.outbox.is_closed()
    }

    /// Queue a frame without waiting.
    pub fn try_deliver(&self, frame: Arc<EventFrame>) -> std::result::Result<(), DeliveryFailure> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(DeliveryFailure::NotAlive);
        }
        self.outbox.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryFailure::Full,
            TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

/// Listener-side handle returned by [`BroadcastHub::register`].
///
/// Dropping the subscription clears its liveness flag, so the hub prunes
/// it on the next pass even if nobody calls
/// [`unregister`](BroadcastHub::unregister).
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Arc<EventFrame>>,
    alive: Arc<AtomicBool>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next frame; `None` once the hub dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<EventFrame>> {
        self.receiver.recv().await
    }

    /// Next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<EventFrame>> {
        self.receiver.try_recv().ok()
    }

    /// Mark the listener dead. The hub prunes it on the next pass.
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.mark_dead();
    }
}

/// Counters reported by [`BroadcastHub::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub subscribers: usize,
    pub events_broadcast: u64,
    pub events_discarded: u64,
    pub deliveries: u64,
    pub pruned: u64,
}

/// Result of one broadcast pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub pruned: Vec<(SubscriberId, DeliveryFailure)>,
}

#[derive(Debug, Default)]
struct Counters {
    events_broadcast: AtomicU64,
    events_discarded: AtomicU64,
    deliveries: AtomicU64,
    pruned: AtomicU64,
}

/// Registry of live subscribers.
///
/// # Examples
///
/// ```
/// use taglink_core::{Identity, ObservedAt, TagEvent};
/// use taglink_pipeline::BroadcastHub;
///
/// let hub = BroadcastHub::default();
/// let mut subscription = hub.register("example").unwrap();
///
/// let event = TagEvent {
///     identity: Identity::new("E2000001"),
///     name: None,
///     antenna: Some(1),
///     signal_strength: Some(-40.0),
///     observed_at: ObservedAt::now(),
///     seen_count: 1,
/// };
///
/// let outcome = hub.broadcast(&event);
/// assert_eq!(outcome.delivered, 1);
/// assert_eq!(subscription.try_recv().unwrap().identity, "E2000001");
/// ```
#[derive(Debug)]
pub struct BroadcastHub {
    subscribers: RwLock<HashMap<SubscriberId, Arc<Subscriber>>>,
    outbox_capacity: usize,
    max_subscribers: usize,
    counters: Counters,
}

impl BroadcastHub {
    pub fn new(outbox_capacity: usize, max_subscribers: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            outbox_capacity: outbox_capacity.max(1),
            max_subscribers,
            counters: Counters::default(),
        }
    }

    /// Add a listener. `label` is only used in logs (e.g. a peer address).
    pub fn register(&self, label: impl Into<String>) -> Result<Subscription> {
        let mut subscribers = self.subscribers.write();
        if subscribers.len() >= self.max_subscribers {
            return Err(PipelineError::SubscriberLimit {
                max: self.max_subscribers,
            });
        }

        let (outbox, receiver) = mpsc::channel(self.outbox_capacity);
        let alive = Arc::new(AtomicBool::new(true));
        let subscriber = Arc::new(Subscriber {
            id: SubscriberId::generate(),
            label: label.into(),
            outbox,
            alive: alive.clone(),
            connected_at: Utc::now(),
        });
        let id = subscriber.id;

        info!(
            subscriber_id = %id,
            peer = %subscriber.label,
            total = subscribers.len() + 1,
            "Subscriber registered"
        );
        subscribers.insert(id, subscriber);

        Ok(Subscription {
            id,
            receiver,
            alive,
        })
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.write().remove(&id);
        match removed {
            Some(subscriber) => {
                subscriber.alive.store(false, Ordering::Release);
                info!(subscriber_id = %id, peer = %subscriber.label, "Subscriber unregistered");
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.subscribers.read().len()
    }

    #[inline]
    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.read().is_empty()
    }

    /// Snapshot of the registered subscribers.
    pub fn subscribers(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers.read().values().cloned().collect()
    }

    /// Deliver `event` to every subscriber, pruning the ones that fail.
    pub fn broadcast(&self, event: &TagEvent) -> BroadcastOutcome {
        let snapshot = self.subscribers();
        if snapshot.is_empty() {
            self.counters.events_discarded.fetch_add(1, Ordering::Relaxed);
            debug!(identity = %event.identity, "No subscribers, event discarded");
            return BroadcastOutcome::default();
        }

        let frame = Arc::new(event.to_frame());
        let mut outcome = BroadcastOutcome::default();

        for subscriber in &snapshot {
            match subscriber.try_deliver(frame.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(reason) => outcome.pruned.push((subscriber.id, reason)),
            }
        }

        if !outcome.pruned.is_empty() {
            let mut subscribers = self.subscribers.write();
            for (id, reason) in &outcome.pruned {
                if let Some(subscriber) = subscribers.remove(id) {
                    subscriber.alive.store(false, Ordering::Release);
                    let err = PipelineError::delivery(*id, *reason);
                    warn!(subscriber_id = %id, peer = %subscriber.label, "{}, pruned", err);
                }
            }
        }

        self.counters.events_broadcast.fetch_add(1, Ordering::Relaxed);
        self.counters
            .deliveries
            .fetch_add(outcome.delivered as u64, Ordering::Relaxed);
        self.counters
            .pruned
            .fetch_add(outcome.pruned.len() as u64, Ordering::Relaxed);

        trace!(
            identity = %event.identity,
            delivered = outcome.delivered,
            pruned = outcome.pruned.len(),
            "Event broadcast"
        );
        outcome
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            subscribers: self.count(),
            events_broadcast: self.counters.events_broadcast.load(Ordering::Relaxed),
            events_discarded: self.counters.events_discarded.load(Ordering::Relaxed),
            deliveries: self.counters.deliveries.load(Ordering::Relaxed),
            pruned: self.counters.pruned.load(Ordering::Relaxed),
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY, DEFAULT_MAX_SUBSCRIBERS)
    }
}
