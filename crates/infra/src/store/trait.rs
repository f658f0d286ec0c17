use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockledger_inventory::{
    InventoryError, InventoryItem, ItemDetails, ItemType, LedgerEntry, LedgerQuery, StockCommand,
};

/// Storage failure.
///
/// These are infrastructure errors, as opposed to the stock validation
/// failures a command's decision can return. Every variant surfaces to callers
/// of a mutating operation as `InventoryError::TransactionAborted`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached (pool closed, I/O, timeout).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Lock contention or serialization failure; retrying may succeed.
    #[error("concurrent write conflict: {0}")]
    Conflict(String),

    /// A write was refused by a storage constraint (e.g. negative quantity).
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The unit of work was rolled back.
    #[error("unit of work aborted: {0}")]
    Aborted(String),
}

impl From<StoreError> for InventoryError {
    fn from(value: StoreError) -> Self {
        InventoryError::TransactionAborted(value.to_string())
    }
}

/// Item rows plus the append-only ledger, behind one transactional boundary.
///
/// ## Execute semantics
///
/// `execute()` runs one `StockCommand` as a single atomic, isolated unit:
/// - lock the command's reference (if any), then load the entries under it
/// - lock every item row in `UnitScope::lock_order` (ascending item type)
/// - build a `UnitSnapshot` and call `StockCommand::decide`
/// - on success write the changed rows and append the entries, then commit
///
/// A decision error or a storage failure leaves no trace: no row changes and
/// no entry is appended. Two units that share an item row never interleave;
/// units on disjoint rows may run in parallel.
///
/// The plain CRUD methods are pure persistence with no ledger side effect.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get(&self, item_type: ItemType) -> Result<Option<InventoryItem>, StoreError>;

    /// Insert or replace a row. Refuses a negative quantity.
    async fn upsert(&self, item: InventoryItem) -> Result<(), StoreError>;

    /// Replace an item's metadata under its row lock, creating the row at
    /// quantity zero if absent. Quantity is never touched.
    async fn update_details(
        &self,
        item_type: ItemType,
        details: ItemDetails,
        at: DateTime<Utc>,
    ) -> Result<InventoryItem, StoreError>;

    /// All rows, ordered by item type.
    async fn list(&self) -> Result<Vec<InventoryItem>, StoreError>;

    /// Returns whether a row was removed.
    async fn delete(&self, item_type: ItemType) -> Result<bool, StoreError>;

    /// Ledger entries matching `query`, in ledger order.
    async fn ledger(&self, query: &LedgerQuery) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Run `command` as one unit of work; returns the appended entries.
    async fn execute(&self, command: &StockCommand) -> Result<Vec<LedgerEntry>, InventoryError>;
}

#[async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    async fn get(&self, item_type: ItemType) -> Result<Option<InventoryItem>, StoreError> {
        (**self).get(item_type).await
    }

    async fn upsert(&self, item: InventoryItem) -> Result<(), StoreError> {
        (**self).upsert(item).await
    }

    async fn update_details(
        &self,
        item_type: ItemType,
        details: ItemDetails,
        at: DateTime<Utc>,
    ) -> Result<InventoryItem, StoreError> {
        (**self).update_details(item_type, details, at).await
    }

    async fn list(&self) -> Result<Vec<InventoryItem>, StoreError> {
        (**self).list().await
    }

    async fn delete(&self, item_type: ItemType) -> Result<bool, StoreError> {
        (**self).delete(item_type).await
    }

    async fn ledger(&self, query: &LedgerQuery) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).ledger(query).await
    }

    async fn execute(&self, command: &StockCommand) -> Result<Vec<LedgerEntry>, InventoryError> {
        (**self).execute(command).await
    }
}
