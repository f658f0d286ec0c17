//! Stock ledger error taxonomy.

use rust_decimal::Decimal;
use thiserror::Error;

use stockledger_core::DomainError;

use crate::item::ItemType;

pub type InventoryResult<T> = Result<T, InventoryError>;

/// Failure of a stock operation.
///
/// Validation failures (`ItemNotFound`, `InsufficientStock`, `InvalidReason`,
/// `Validation`, `Conflict`) are raised before anything is written.
/// `TransactionAborted` means the backing store could not commit; the caller
/// must assume nothing was written and may retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("inventory item not found: {item_type}")]
    ItemNotFound { item_type: ItemType },

    #[error("insufficient stock for {item_type}: available {available}, requested {requested}")]
    InsufficientStock {
        item_type: ItemType,
        available: Decimal,
        requested: Decimal,
    },

    #[error("invalid adjustment reason: {0}")]
    InvalidReason(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
}

impl InventoryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        Self::TransactionAborted(msg.into())
    }
}

impl From<DomainError> for InventoryError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidId(msg) => InventoryError::Validation(msg),
        }
    }
}
