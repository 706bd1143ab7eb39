use super::ReconciliationStore;
use crate::error::StorageResult;
use crate::models::{StoredEvent, TagFields, TagRecordRow};
use sqlx::SqlitePool;
use tracing::trace;

/// SQLite-backed reconciliation store over the `tag_readings` table.
///
/// Each upsert is a single `INSERT ... ON CONFLICT(epc) DO UPDATE`
/// statement, so SQLite's write lock provides the per-identity
/// serialization. The `revision` column tells creation (0) from update.
#[derive(Debug, Clone)]
pub struct SqliteTagStore {
    pool: SqlitePool,
}

impl SqliteTagStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn product_name(&self, epc: &str) -> StorageResult<Option<String>> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM products WHERE epc = ?")
            .bind(epc)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }
}

impl ReconciliationStore for SqliteTagStore {
    async fn upsert(&self, identity: &str, fields: &TagFields) -> StorageResult<StoredEvent> {
        let mut row = sqlx::query_as::<_, TagRecordRow>(
            r#"
            INSERT INTO tag_readings (epc, antenna, signal_strength, observed_at, seen_count)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(epc) DO UPDATE SET
                antenna         = excluded.antenna,
                signal_strength = excluded.signal_strength,
                observed_at     = excluded.observed_at,
                seen_count      = excluded.seen_count,
                revision        = tag_readings.revision + 1,
                updated_at      = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            RETURNING id, epc, NULL AS name, antenna, signal_strength,
                      observed_at, seen_count, revision = 0 AS created
            "#,
        )
        .bind(identity)
        .bind(fields.antenna.map(i64::from))
        .bind(fields.signal_strength)
        .bind(fields.observed_at.as_micros())
        .bind(i64::from(fields.seen_count))
        .fetch_one(&self.pool)
        .await?;

        row.name = self.product_name(identity).await?;
        let stored = row.into_stored()?;

        trace!(identity, created = stored.created, "tag record upserted");
        Ok(stored)
    }

    async fn list_recent(&self, skip: u32, limit: u32) -> StorageResult<Vec<StoredEvent>> {
        let rows = sqlx::query_as::<_, TagRecordRow>(
            r#"
            SELECT t.id, t.epc, p.name, t.antenna, t.signal_strength,
                   t.observed_at, t.seen_count, 0 AS created
            FROM tag_readings t
            LEFT JOIN products p ON p.epc = t.epc
            ORDER BY t.observed_at DESC, t.id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(i64::from(limit))
        .bind(i64::from(skip))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TagRecordRow::into_stored).collect()
    }
}
