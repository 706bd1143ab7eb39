//! SQLite pool setup.
//!
//! [`Database`] owns the pool every SQL-backed store shares. A file-backed
//! database runs in WAL mode so the ingest worker can write while readers
//! list recent tags; an in-memory database pins a single connection because
//! each SQLite memory connection is a separate database.
//!
//! ```no_run
//! use taglink_storage::{Database, DatabaseConfig};
//!
//! # async fn example() -> taglink_storage::StorageResult<()> {
//! let db = Database::new(DatabaseConfig::new("data/taglink.db").max_connections(4)).await?;
//! db.health_check().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{StorageError, StorageResult};
use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Where the tag state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

impl fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory => f.write_str(":memory:"),
        }
    }
}

/// Pool and pragma settings for [`Database::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub location: DatabaseLocation,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
    pub acquire_timeout: Duration,
    pub create_if_missing: bool,
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new("taglink.db")
    }
}

impl DatabaseConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            location: DatabaseLocation::File(path.as_ref().to_path_buf()),
            max_connections: 4,
            min_connections: 1,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(10),
            create_if_missing: true,
            auto_migrate: true,
        }
    }

    /// Single pinned in-memory connection.
    pub fn memory() -> Self {
        Self {
            location: DatabaseLocation::Memory,
            max_connections: 1,
            min_connections: 1,
            ..Self::new("")
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn auto_migrate(mut self, migrate: bool) -> Self {
        self.auto_migrate = migrate;
        self
    }

    fn connect_options(&self) -> StorageResult<SqliteConnectOptions> {
        let options = match &self.location {
            DatabaseLocation::Memory => SqliteConnectOptions::new().in_memory(true),
            DatabaseLocation::File(path) => {
                ensure_parent_dir(path)?;
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(self.create_if_missing)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
            }
        };

        Ok(options
            .busy_timeout(self.busy_timeout)
            .disable_statement_logging())
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections.max(1))
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout);

        match self.location {
            // Recycling the connection would drop the database with it
            DatabaseLocation::Memory => pool.max_connections(1).idle_timeout(None).max_lifetime(None),
            DatabaseLocation::File(_) => pool,
        }
    }
}

fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Configuration(format!(
                    "cannot create directory {} for database: {}",
                    parent.display(),
                    e
                ))
            })
        }
        _ => Ok(()),
    }
}

/// Shared SQLite pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect according to `config`, applying migrations when
    /// `auto_migrate` is set.
    ///
    /// # Errors
    ///
    /// [`StorageError::Configuration`] when the database directory cannot be
    /// created; database or migration errors otherwise.
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        let pool = config
            .pool_options()
            .connect_with(config.connect_options()?)
            .await?;
        info!(location = %config.location, "database opened");

        let db = Self { pool };
        if config.auto_migrate {
            db.migrate().await?;
        }
        Ok(db)
    }

    /// Migrated in-memory database.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::new(DatabaseConfig::memory()).await
    }

    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        debug!("migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
