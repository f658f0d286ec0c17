//! Infrastructure layer: storage backends, configuration, and the ledger
//! service that ties them to the pure inventory domain.

pub mod config;
pub mod ledger_service;
pub mod store;


pub use config::{ConfigError, LedgerConfig};
pub use ledger_service::InventoryLedger;
pub use store::{InMemoryInventoryStore, InventoryStore, PostgresInventoryStore, StoreError};
