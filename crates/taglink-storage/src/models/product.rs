use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Catalogued item carrying an RFID tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,

    /// Tag identity, unique across products.
    pub epc: String,

    pub name: String,

    pub description: Option<String>,

    /// Units in stock.
    pub stock: i64,

    /// Location of the product image, stored as given.
    pub image_url: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Product fields supplied on create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub epc: String,
    pub name: String,
    pub description: Option<String>,
    pub stock: i64,
    pub image_url: Option<String>,
}

impl NewProduct {
    pub fn new(epc: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            epc: epc.into(),
            name: name.into(),
            description: None,
            stock: 0,
            image_url: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn stock(mut self, stock: i64) -> Self {
        self.stock = stock;
        self
    }

    pub fn image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// Check the fields the schema constrains.
    pub fn validate(&self) -> crate::StorageResult<()> {
        if self.epc.trim().is_empty() {
            return Err(crate::StorageError::Validation("product epc must not be blank".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(crate::StorageError::Validation("product name must not be blank".to_string()));
        }
        if self.stock < 0 {
            return Err(crate::StorageError::Validation(format!(
                "product stock must not be negative, got {}",
                self.stock
            )));
        }
        Ok(())
    }
}
