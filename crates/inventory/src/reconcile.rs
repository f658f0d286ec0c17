//! Replay of the ledger against the cached item quantities.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::item::{InventoryItem, ItemType};
use crate::ledger::LedgerEntry;

/// Outcome of replaying one item's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub item_type: ItemType,
    /// Quantity on the item row (`None` when the row was deleted).
    pub recorded: Option<Decimal>,
    /// Initial quantity plus every change in the ledger.
    pub replayed: Decimal,
    pub entry_count: usize,
    /// Entries whose after-quantity does not equal before + change, or whose
    /// change overflows the replay.
    pub unbalanced_entries: usize,
    /// Entries whose before-quantity does not continue the previous entry.
    pub chain_breaks: usize,
}

impl ReconciliationReport {
    pub fn drift(&self) -> Decimal {
        self.recorded.unwrap_or(Decimal::ZERO) - self.replayed
    }

    pub fn is_consistent(&self) -> bool {
        self.drift().is_zero() && self.unbalanced_entries == 0 && self.chain_breaks == 0
    }
}

/// Replay the entries of `item_type` found in `entries` (ledger order).
///
/// The initial quantity is the first entry's `quantity_before`; an item with
/// no entries replays to its own recorded quantity.
pub fn reconcile_item(
    item_type: ItemType,
    item: Option<&InventoryItem>,
    entries: &[LedgerEntry],
) -> ReconciliationReport {
    let recorded = item.map(|i| i.quantity);
    let own: Vec<&LedgerEntry> = entries.iter().filter(|e| e.item_type == item_type).collect();
    let initial = own
        .first()
        .map(|e| e.quantity_before)
        .or(recorded)
        .unwrap_or(Decimal::ZERO);

    let mut replayed = initial;
    let mut unbalanced_entries = 0;
    let mut chain_breaks = 0;
    let mut previous_after: Option<Decimal> = None;

    for e in &own {
        if matches!(previous_after, Some(prev) if prev != e.quantity_before) {
            chain_breaks += 1;
        }
        previous_after = Some(e.quantity_after);
        // A change the running total cannot absorb is not replayable.
        match replayed.checked_add(e.change_amount) {
            Some(next) if e.is_balanced() => replayed = next,
            Some(next) => {
                unbalanced_entries += 1;
                replayed = next;
            }
            None => unbalanced_entries += 1,
        }
    }

    ReconciliationReport {
        item_type,
        recorded,
        replayed,
        entry_count: own.len(),
        unbalanced_entries,
        chain_breaks,
    }
}

/// Reconcile every item type that has a row or any ledger history.
pub fn reconcile_all(items: &[InventoryItem], entries: &[LedgerEntry]) -> Vec<ReconciliationReport> {
    ItemType::ALL
        .into_iter()
        .filter_map(|item_type| {
            let item = items.iter().find(|i| i.item_type == item_type);
            let tracked = entries.iter().any(|e| e.item_type == item_type);
            if item.is_none() && !tracked {
                return None;
            }
            Some(reconcile_item(item_type, item, entries))
        })
        .collect()
}
