//! Per-session ingest worker.
//!
//! The driver callback only forwards [`DriverReport`]s into an unbounded
//! channel. The worker drains that channel in order: it normalizes each
//! batch, reconciles every event with the store and pushes the result into
//! the [`IngestionQueue`]. It exits once the driver drops its callback.

use crate::queue::IngestionQueue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use taglink_core::constants::UNKNOWN_IDENTITY;
use taglink_core::{Identity, NormalizerConfig, ObservedAt, RawReading, TagEvent, normalize_batch};
use taglink_hardware::DriverReport;
use taglink_storage::{ReconciliationStore, StorageResult, TagFields};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

/// What happens to readings that carry no identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownIdentityPolicy {
    /// Broadcast with the `"N/A"` identity, never store.
    #[default]
    BroadcastOnly,

    /// Drop the reading.
    Skip,

    /// Store under the shared `"N/A"` key and broadcast.
    StoreAsSentinel,
}

impl fmt::Display for UnknownIdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BroadcastOnly => write!(f, "broadcast-only"),
            Self::Skip => write!(f, "skip"),
            Self::StoreAsSentinel => write!(f, "store-as-sentinel"),
        }
    }
}

/// Drains one session's driver reports into the queue.
pub(crate) struct IngestWorker<S> {
    session_id: u64,
    store: Arc<S>,
    queue: Arc<IngestionQueue>,
    normalizer: NormalizerConfig,
    policy: UnknownIdentityPolicy,
}

impl<S: ReconciliationStore> IngestWorker<S> {
    pub(crate) fn new(
        session_id: u64,
        store: Arc<S>,
        queue: Arc<IngestionQueue>,
        normalizer: NormalizerConfig,
        policy: UnknownIdentityPolicy,
    ) -> Self {
        Self {
            session_id,
            store,
            queue,
            normalizer,
            policy,
        }
    }

    /// Run until the report channel closes.
    ///
    /// `on_fault` is called once per fault report; batches already received
    /// are still ingested.
    pub(crate) async fn run<F>(self, mut reports: mpsc::UnboundedReceiver<DriverReport>, on_fault: F)
    where
        F: Fn(String) + Send,
    {
        let mut batches = 0u64;
        while let Some(report) = reports.recv().await {
            match report {
                DriverReport::Readings(readings) => {
                    batches += 1;
                    if let Err(e) = self.ingest_batch(&readings).await {
                        error!(
                            session_id = self.session_id,
                            error = %e,
                            "Store failed, rest of batch discarded"
                        );
                    }
                }
                DriverReport::Fault { message } => {
                    warn!(session_id = self.session_id, %message, "Reader link fault");
                    on_fault(message);
                }
            }
        }
        debug!(session_id = self.session_id, batches, "Ingest worker finished");
    }

    /// Normalize, reconcile and enqueue one batch.
    ///
    /// Returns the number of events queued. A store failure aborts the
    /// remainder of the batch; events queued before it stay queued.
    pub(crate) async fn ingest_batch(&self, readings: &[RawReading]) -> StorageResult<usize> {
        let events = normalize_batch(readings, &self.normalizer, ObservedAt::now());
        let mut queued = 0;

        for event in events {
            let key = match (&event.identity, self.policy) {
                (Identity::Known(code), _) => Some(code.clone()),
                (Identity::Unknown, UnknownIdentityPolicy::BroadcastOnly) => None,
                (Identity::Unknown, UnknownIdentityPolicy::Skip) => {
                    debug!(session_id = self.session_id, "Skipping reading without identity");
                    continue;
                }
                (Identity::Unknown, UnknownIdentityPolicy::StoreAsSentinel) => {
                    Some(UNKNOWN_IDENTITY.to_string())
                }
            };

            let event = match key {
                Some(key) => self.reconcile(&key, event).await?,
                None => event,
            };

            trace!(session_id = self.session_id, identity = %event.identity, "Event queued");
            self.queue.push(event);
            queued += 1;
        }

        Ok(queued)
    }

    async fn reconcile(&self, key: &str, event: TagEvent) -> StorageResult<TagEvent> {
        let stored = self.store.upsert(key, &TagFields::from(&event)).await?;
        trace!(
            session_id = self.session_id,
            identity = key,
            created = stored.created,
            "Reconciled"
        );
        Ok(event.with_name(stored.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use taglink_storage::{MemoryTagStore, StorageError, StoredEvent};

    struct FailingStore;

    impl ReconciliationStore for FailingStore {
        async fn upsert(&self, _identity: &str, _fields: &TagFields) -> StorageResult<StoredEvent> {
            Err(StorageError::Validation("store offline".to_string()))
        }

        async fn list_recent(&self, _skip: u32, _limit: u32) -> StorageResult<Vec<StoredEvent>> {
            Ok(Vec::new())
        }
    }

    fn worker<S: ReconciliationStore>(store: S, policy: UnknownIdentityPolicy) -> IngestWorker<S> {
        IngestWorker::new(
            1,
            Arc::new(store),
            Arc::new(IngestionQueue::default()),
            NormalizerConfig::default(),
            policy,
        )
    }

    fn reading(epc: Option<&str>) -> RawReading {
        let reading = RawReading::new()
            .with("AntennaID", 1)
            .with("PeakRSSI", -40)
            .with("LastSeenTimestampUTC", 1_700_000_000);
        match epc {
            Some(epc) => reading.with("EPC-96", epc),
            None => reading,
        }
    }

    #[tokio::test]
    async fn test_known_identity_is_stored_and_named() {
        let store = MemoryTagStore::new();
        store.set_name("E1", "Pallet");
        let worker = worker(store.clone(), UnknownIdentityPolicy::default());

        let queued = worker.ingest_batch(&[reading(Some("E1"))]).await.unwrap();

        assert_eq!(queued, 1);
        assert_eq!(store.len(), 1);
        let event = worker.queue.try_take().unwrap();
        assert_eq!(event.name.as_deref(), Some("Pallet"));
    }

    #[rstest]
    #[case(UnknownIdentityPolicy::BroadcastOnly, 1, 0)]
    #[case(UnknownIdentityPolicy::Skip, 0, 0)]
    #[case(UnknownIdentityPolicy::StoreAsSentinel, 1, 1)]
    #[tokio::test]
    async fn test_unknown_identity_policy(
        #[case] policy: UnknownIdentityPolicy,
        #[case] expected_queued: usize,
        #[case] expected_stored: usize,
    ) {
        let store = MemoryTagStore::new();
        let worker = worker(store.clone(), policy);

        let queued = worker.ingest_batch(&[reading(None)]).await.unwrap();

        assert_eq!(queued, expected_queued);
        assert_eq!(store.len(), expected_stored);
        if let Some(event) = worker.queue.try_take() {
            assert_eq!(event.identity, Identity::Unknown);
        }
    }

    #[tokio::test]
    async fn test_store_failure_aborts_batch() {
        let worker = worker(FailingStore, UnknownIdentityPolicy::BroadcastOnly);

        // The identity-less reading is broadcast-only and queued before the failure
        let batch = [reading(None), reading(Some("E1")), reading(None)];
        let err = worker.ingest_batch(&batch).await.unwrap_err();

        assert!(matches!(err, StorageError::Validation(_)));
        assert_eq!(worker.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_reading_skipped() {
        let worker = worker(MemoryTagStore::new(), UnknownIdentityPolicy::default());
        let bad = reading(Some("E2")).with("TagSeenCount", 0);

        let queued = worker.ingest_batch(&[bad, reading(Some("E3"))]).await.unwrap();

        assert_eq!(queued, 1);
        assert_eq!(worker.queue.try_take().unwrap().identity, Identity::new("E3"));
    }

    #[tokio::test]
    async fn test_run_reports_fault_and_drains() {
        let worker = worker(MemoryTagStore::new(), UnknownIdentityPolicy::default());
        let queue = worker.queue.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let faults = Arc::new(parking_lot::Mutex::new(Vec::new()));

        tx.send(DriverReport::Readings(vec![reading(Some("E1"))])).unwrap();
        tx.send(DriverReport::Fault {
            message: "link lost".to_string(),
        })
        .unwrap();
        drop(tx);

        let seen = faults.clone();
        worker.run(rx, move |message| seen.lock().push(message)).await;

        assert_eq!(queue.len(), 1);
        assert_eq!(*faults.lock(), vec!["link lost".to_string()]);
    }
}
