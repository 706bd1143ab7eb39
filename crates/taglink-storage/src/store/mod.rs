//! Reconciliation stores.
//!
//! A reconciliation store keeps exactly one current record per tag
//! identity. Every [`upsert`](ReconciliationStore::upsert) either creates
//! that record or overwrites its mutable fields; which one happened is
//! reported in [`StoredEvent::created`].
//!
//! Upserts for the same identity are serialized by the store (last writer
//! wins); different identities proceed independently.

use crate::error::StorageResult;
use crate::models::{StoredEvent, TagFields};
use std::future::Future;

mod memory;
mod sqlite;

pub use memory::MemoryTagStore;
pub use sqlite::SqliteTagStore;

/// Latest-state-per-identity table.
///
/// Futures are `Send` so the pipeline can drive them from spawned tasks.
pub trait ReconciliationStore: Send + Sync + 'static {
    /// Create or update the record for `identity`.
    fn upsert(
        &self,
        identity: &str,
        fields: &TagFields,
    ) -> impl Future<Output = StorageResult<StoredEvent>> + Send;

    /// Records ordered by observation time, most recent first.
    fn list_recent(
        &self,
        skip: u32,
        limit: u32,
    ) -> impl Future<Output = StorageResult<Vec<StoredEvent>>> + Send;
}

/// Store selected at runtime.
#[derive(Debug, Clone)]
pub enum AnyTagStore {
    Sqlite(SqliteTagStore),
    Memory(MemoryTagStore),
}

impl ReconciliationStore for AnyTagStore {
    async fn upsert(&self, identity: &str, fields: &TagFields) -> StorageResult<StoredEvent> {
        match self {
            Self::Sqlite(store) => store.upsert(identity, fields).await,
            Self::Memory(store) => store.upsert(identity, fields).await,
        }
    }

    async fn list_recent(&self, skip: u32, limit: u32) -> StorageResult<Vec<StoredEvent>> {
        match self {
            Self::Sqlite(store) => store.list_recent(skip, limit).await,
            Self::Memory(store) => store.list_recent(skip, limit).await,
        }
    }
}

impl From<SqliteTagStore> for AnyTagStore {
    fn from(store: SqliteTagStore) -> Self {
        Self::Sqlite(store)
    }
}

impl From<MemoryTagStore> for AnyTagStore {
    fn from(store: MemoryTagStore) -> Self {
        Self::Memory(store)
    }
}
