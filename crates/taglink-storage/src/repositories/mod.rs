//! Repository traits and SQLite implementations.

mod product;

pub use product::{ProductRepository, SqliteProductRepository};
