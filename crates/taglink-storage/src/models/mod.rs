//! Storage models.

mod product;
mod tag_record;

pub use product::{NewProduct, Product};
pub use tag_record::{StoredEvent, TagFields, TagRecordRow};
