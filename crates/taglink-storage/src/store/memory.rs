use super::ReconciliationStore;
use crate::error::StorageResult;
use crate::models::{StoredEvent, TagFields};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, StoredEvent>,
    names: HashMap<String, String>,
    next_id: i64,
}

/// In-memory reconciliation store.
///
/// Clones share the same table. Display names come from names registered
/// with [`set_name`](Self::set_name).
#[derive(Debug, Clone, Default)]
pub struct MemoryTagStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the display name for `identity`.
    pub fn set_name(&self, identity: impl Into<String>, name: impl Into<String>) {
        let mut inner = self.inner.lock();
        let identity = identity.into();
        let name = name.into();
        if let Some(record) = inner.records.get_mut(&identity) {
            record.name = Some(name.clone());
        }
        inner.names.insert(identity, name);
    }

    /// Number of stored identities.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// Current record for `identity`.
    pub fn get(&self, identity: &str) -> Option<StoredEvent> {
        self.inner.lock().records.get(identity).cloned()
    }

    fn upsert_sync(&self, identity: &str, fields: &TagFields) -> StoredEvent {
        let mut inner = self.inner.lock();
        let name = inner.names.get(identity).cloned();

        if let Some(record) = inner.records.get_mut(identity) {
            record.antenna = fields.antenna;
            record.signal_strength = fields.signal_strength;
            record.observed_at = fields.observed_at;
            record.seen_count = fields.seen_count;
            record.name = name;
            record.created = false;
            return record.clone();
        }

        inner.next_id += 1;
        let record = StoredEvent {
            id: inner.next_id,
            identity: identity.to_string(),
            name,
            antenna: fields.antenna,
            signal_strength: fields.signal_strength,
            observed_at: fields.observed_at,
            seen_count: fields.seen_count,
            created: true,
        };
        inner.records.insert(identity.to_string(), record.clone());
        record
    }
}

impl ReconciliationStore for MemoryTagStore {
    async fn upsert(&self, identity: &str, fields: &TagFields) -> StorageResult<StoredEvent> {
        Ok(self.upsert_sync(identity, fields))
    }

    async fn list_recent(&self, skip: u32, limit: u32) -> StorageResult<Vec<StoredEvent>> {
        let inner = self.inner.lock();
        let mut records: Vec<StoredEvent> = inner
            .records
            .values()
            .cloned()
            .map(|mut r| {
                r.created = false;
                r
            })
            .collect();
        drop(inner);

        records.sort_by(|a, b| b.observed_at.cmp(&a.observed_at).then(b.id.cmp(&a.id)));
        Ok(records
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect())
    }
}
