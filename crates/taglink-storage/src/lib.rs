//! Storage layer for the taglink pipeline.
//!
//! Holds the latest state of every tag identity and the product catalogue
//! used to give tags display names.
//!
//! # Components
//!
//! - [`Database`]: SQLite pool with automatic migrations.
//! - [`ReconciliationStore`]: the upsert/list contract used by the pipeline,
//!   implemented by [`SqliteTagStore`] and [`MemoryTagStore`] and
//!   dispatched at runtime through [`AnyTagStore`].
//! - [`ProductRepository`]: product catalogue CRUD.
//!
//! The `taglink` binary only reads `products`, to resolve tag names. The
//! catalogue is written by whatever manages it, either through
//! [`SqliteProductRepository`] or directly against the same database file;
//! without rows there, events go out with no `name`.
//!
//! # Examples
//!
//! ```no_run
//! use taglink_core::ObservedAt;
//! use taglink_storage::{Database, ReconciliationStore, SqliteTagStore, TagFields};
//!
//! # async fn example() -> taglink_storage::StorageResult<()> {
//! let db = Database::in_memory().await?;
//! let store = SqliteTagStore::new(db.pool().clone());
//!
//! let fields = TagFields {
//!     antenna: Some(1),
//!     signal_strength: Some(-42.0),
//!     observed_at: ObservedAt::now(),
//!     seen_count: 1,
//! };
//!
//! let stored = store.upsert("E2003412", &fields).await?;
//! assert!(stored.created);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use connection::{Database, DatabaseConfig, DatabaseLocation};
pub use error::{StorageError, StorageResult};
pub use models::{NewProduct, Product, StoredEvent, TagFields};
pub use repositories::{ProductRepository, SqliteProductRepository};
pub use store::{AnyTagStore, MemoryTagStore, ReconciliationStore, SqliteTagStore};
