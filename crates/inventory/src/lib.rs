//! Inventory ledger domain (pure).
//!
//! Item and ledger models, the three stock engines (adjustment, event
//! consumption, event reversal) expressed as pure decisions over a locked
//! snapshot, and the read-only status and reconciliation views. Storage,
//! locking and commit live in `stockledger-infra`.

pub mod adjustment;
pub mod command;
pub mod consumption;
pub mod error;
pub mod item;
pub mod ledger;
pub mod reconcile;
pub mod reversal;
pub mod status;
pub mod unit;

pub use adjustment::AdjustStock;
pub use command::StockCommand;
pub use consumption::{ConsumeForEvent, ConsumptionProfile};
pub use error::{InventoryError, InventoryResult};
pub use item::{InventoryItem, ItemDetails, ItemType, Unit};
pub use ledger::{AdjustmentReason, LedgerEntry, LedgerQuery, Reference};
pub use reconcile::{ReconciliationReport, reconcile_all, reconcile_item};
pub use reversal::{ReverseEvent, outstanding_by_item};
pub use status::{
    AlertCandidate, ExpirationCandidate, ExpirationStatus, Severity, StockPolicy, expiring,
    low_stock,
};
pub use unit::{Changeset, OnMissing, Posting, PostingLine, UnitScope, UnitSnapshot};
