#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::{NewProduct, Product};
use sqlx::SqlitePool;
use tracing::debug;

/// Product catalogue access.
///
/// Products map tag identities to display names; the reconciliation store
/// reads them when resolving [`StoredEvent::name`](crate::StoredEvent::name).
/// The pipeline never writes them: this is the entry point for catalogue
/// management tools sharing the database.
pub trait ProductRepository: Send + Sync {
    /// Insert a product and return its id.
    ///
    /// Fails with [`StorageError::Duplicate`] when the EPC is already
    /// catalogued.
    async fn create(&self, product: &NewProduct) -> StorageResult<i64>;

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<Product>>;

    async fn find_by_epc(&self, epc: &str) -> StorageResult<Option<Product>>;

    /// Products ordered by id.
    async fn list(&self, skip: u32, limit: u32) -> StorageResult<Vec<Product>>;

    /// Replace all fields of product `id`.
    async fn update(&self, id: i64, product: &NewProduct) -> StorageResult<()>;

    async fn delete(&self, id: i64) -> StorageResult<()>;
}

pub struct SqliteProductRepository {
    pool: SqlitePool,
}

impl SqliteProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_unique_violation(err: sqlx::Error, epc: &str) -> StorageError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StorageError::duplicate("Product", "epc", epc)
        }
        _ => StorageError::Database(err),
    }
}

impl ProductRepository for SqliteProductRepository {
    async fn create(&self, product: &NewProduct) -> StorageResult<i64> {
        product.validate()?;

        let result = sqlx::query(
            r#"
            INSERT INTO products (epc, name, description, stock, image_url)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(product.epc.trim())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.stock)
        .bind(&product.image_url)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &product.epc))?;

        debug!(epc = %product.epc, "product created");
        Ok(result.last_insert_rowid())
    }

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, epc, name, description, stock, image_url, created_at, updated_at
            FROM products
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    async fn find_by_epc(&self, epc: &str) -> StorageResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, epc, name, description, stock, image_url, created_at, updated_at
            FROM products
            WHERE epc = ?
            "#,
        )
        .bind(epc)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    async fn list(&self, skip: u32, limit: u32) -> StorageResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, epc, name, description, stock, image_url, created_at, updated_at
            FROM products
            ORDER BY id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(i64::from(limit))
        .bind(i64::from(skip))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    async fn update(&self, id: i64, product: &NewProduct) -> StorageResult<()> {
        product.validate()?;

        let result = sqlx::query(
            r#"
            UPDATE products
            SET epc = ?, name = ?, description = ?, stock = ?, image_url = ?,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?
            "#,
        )
        .bind(product.epc.trim())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.stock)
        .bind(&product.image_url)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &product.epc))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("Product", "id", id));
        }

        Ok(())
    }

    async fn delete(&self, id: i64) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("Product", "id", id));
        }

        debug!(id, "product deleted");
        Ok(())
    }
}
