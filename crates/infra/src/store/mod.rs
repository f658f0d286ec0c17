//! Transactional item-row and ledger storage.
//!
//! One trait, two backends: an in-memory store for tests and local runs, and
//! Postgres for production. Both execute a `StockCommand` as a single locked
//! unit of work.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use r#trait::{InventoryStore, StoreError};
