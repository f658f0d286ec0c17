//! Unit of work: what a stock command locks, what it sees, what it writes.
//!
//! Stores execute every command the same way:
//!
//! ```text
//! scope()            -> lock the reference (if any) and the item rows
//! UnitSnapshot       -> locked rows + entries already under the reference
//! decide(snapshot)   -> Changeset (pure, no IO) or an error
//! commit             -> upsert changed items, append entries, all or nothing
//! ```
//!
//! Nothing here performs IO; the store owns locking and commit.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use stockledger_core::{LedgerEntryId, UserId};

use crate::error::{InventoryError, InventoryResult};
use crate::item::{InventoryItem, ItemType};
use crate::ledger::{AdjustmentReason, LedgerEntry, Reference};

/// Rows a command needs locked before it can decide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitScope {
    /// Item rows named up front by the command.
    pub items: BTreeSet<ItemType>,
    /// Reference whose existing entries must be loaded (and serialized on).
    pub reference: Option<Reference>,
    /// Whether missing item rows are created at quantity zero.
    pub create_missing: bool,
}

impl UnitScope {
    /// Deterministic lock order: the named items plus every item already
    /// touched under the reference, ascending.
    pub fn lock_order(&self, reference_entries: &[LedgerEntry]) -> Vec<ItemType> {
        let mut all = self.items.clone();
        all.extend(reference_entries.iter().map(|e| e.item_type));
        all.into_iter().collect()
    }
}

/// State visible to a command inside its unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitSnapshot {
    items: BTreeMap<ItemType, InventoryItem>,
    reference_entries: Vec<LedgerEntry>,
}

impl UnitSnapshot {
    pub fn new(
        items: impl IntoIterator<Item = InventoryItem>,
        reference_entries: Vec<LedgerEntry>,
    ) -> Self {
        Self {
            items: items.into_iter().map(|i| (i.item_type, i)).collect(),
            reference_entries,
        }
    }

    pub fn item(&self, item_type: ItemType) -> Option<&InventoryItem> {
        self.items.get(&item_type)
    }

    /// Entries already recorded under the scope's reference, in ledger order.
    pub fn reference_entries(&self) -> &[LedgerEntry] {
        &self.reference_entries
    }
}

/// Writes produced by one command; committed together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    pub items: Vec<InventoryItem>,
    pub entries: Vec<LedgerEntry>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.entries.is_empty()
    }

    pub fn quantity_of(&self, item_type: ItemType) -> Option<Decimal> {
        self.items
            .iter()
            .find(|i| i.item_type == item_type)
            .map(|i| i.quantity)
    }
}

/// What to do when a posted item has no row.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OnMissing {
    Create,
    Fail,
}

/// One quantity change to stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingLine<'a> {
    pub item_type: ItemType,
    pub change: Decimal,
    pub reason: AdjustmentReason,
    pub reference: Option<&'a Reference>,
    pub notes: Option<&'a str>,
}

/// Staging area shared by the adjustment, consumption and reversal engines.
///
/// Every `post` reads the item as already staged in this unit, so several
/// lines against the same item chain correctly.
#[derive(Debug)]
pub struct Posting<'s> {
    snapshot: &'s UnitSnapshot,
    staged: BTreeMap<ItemType, InventoryItem>,
    entries: Vec<LedgerEntry>,
    performed_by: UserId,
    at: DateTime<Utc>,
}

impl<'s> Posting<'s> {
    pub fn new(snapshot: &'s UnitSnapshot, performed_by: UserId, at: DateTime<Utc>) -> Self {
        Self {
            snapshot,
            staged: BTreeMap::new(),
            entries: Vec::new(),
            performed_by,
            at,
        }
    }

    /// Current view of an item inside this unit.
    pub fn current(&self, item_type: ItemType) -> Option<&InventoryItem> {
        self.staged
            .get(&item_type)
            .or_else(|| self.snapshot.item(item_type))
    }

    /// Stage one change: validate, update the item, record the entry.
    ///
    /// Returns the quantity after the change.
    pub fn post(&mut self, line: PostingLine<'_>, on_missing: OnMissing) -> InventoryResult<Decimal> {
        if line.change.is_zero() {
            return Err(InventoryError::validation("change amount cannot be zero"));
        }

        let mut item = match (self.current(line.item_type), on_missing) {
            (Some(item), _) => item.clone(),
            (None, OnMissing::Create) => InventoryItem::new(line.item_type, self.at),
            (None, OnMissing::Fail) => {
                return Err(InventoryError::ItemNotFound {
                    item_type: line.item_type,
                });
            }
        };

        let before = item.quantity;
        let after = before.checked_add(line.change).ok_or_else(|| {
            InventoryError::validation(format!(
                "{} quantity {before} cannot absorb a change of {}",
                line.item_type, line.change
            ))
        })?;
        if after < Decimal::ZERO {
            return Err(InventoryError::InsufficientStock {
                item_type: line.item_type,
                available: before,
                requested: -line.change,
            });
        }

        item.quantity = after;
        item.updated_at = self.at;
        self.staged.insert(line.item_type, item);

        self.entries.push(LedgerEntry {
            id: LedgerEntryId::new(),
            item_type: line.item_type,
            change_amount: line.change,
            quantity_before: before,
            quantity_after: after,
            reason: line.reason,
            reference: line.reference.cloned(),
            performed_by: self.performed_by,
            recorded_at: self.at,
            notes: line.notes.map(str::to_string),
        });

        Ok(after)
    }

    pub fn finish(self) -> Changeset {
        Changeset {
            items: self.staged.into_values().collect(),
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stocked(item_type: ItemType, qty: i64) -> InventoryItem {
        let mut item = InventoryItem::new(item_type, Utc::now());
        item.quantity = Decimal::from(qty);
        item
    }

    fn line(item_type: ItemType, change: i64) -> PostingLine<'static> {
        PostingLine {
            item_type,
            change: Decimal::from(change),
            reason: AdjustmentReason::ManualAdjustment,
            reference: None,
            notes: None,
        }
    }

    #[test]
    fn consecutive_posts_chain_on_staged_quantity() {
        let snapshot = UnitSnapshot::new([stocked(ItemType::Needle, 5)], vec![]);
        let mut posting = Posting::new(&snapshot, UserId::new(), Utc::now());

        assert_eq!(posting.post(line(ItemType::Needle, -2), OnMissing::Fail).unwrap(), Decimal::from(3));
        assert_eq!(posting.post(line(ItemType::Needle, -3), OnMissing::Fail).unwrap(), Decimal::ZERO);

        let err = posting.post(line(ItemType::Needle, -1), OnMissing::Fail).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                item_type: ItemType::Needle,
                available: Decimal::ZERO,
                requested: Decimal::ONE,
            }
        );

        let changes = posting.finish();
        assert_eq!(changes.items.len(), 1);
        assert_eq!(changes.entries.len(), 2);
        assert_eq!(changes.entries[1].quantity_before, Decimal::from(3));
        assert!(changes.entries.iter().all(LedgerEntry::is_balanced));
    }

    #[test]
    fn missing_item_is_created_or_refused() {
        let snapshot = UnitSnapshot::default();
        let mut posting = Posting::new(&snapshot, UserId::new(), Utc::now());

        let err = posting.post(line(ItemType::Bandage, 1), OnMissing::Fail).unwrap_err();
        assert_eq!(err, InventoryError::ItemNotFound { item_type: ItemType::Bandage });

        let after = posting.post(line(ItemType::Bandage, 4), OnMissing::Create).unwrap();
        assert_eq!(after, Decimal::from(4));
    }

    #[test]
    fn overflowing_change_is_a_validation_error() {
        let mut full = stocked(ItemType::Needle, 0);
        full.quantity = Decimal::MAX;
        let snapshot = UnitSnapshot::new([full], vec![]);
        let mut posting = Posting::new(&snapshot, UserId::new(), Utc::now());

        assert!(matches!(
            posting.post(line(ItemType::Needle, 1), OnMissing::Fail),
            Err(InventoryError::Validation(_))
        ));
        assert!(posting.finish().is_empty());
    }

    #[test]
    fn zero_change_is_rejected() {
        let snapshot = UnitSnapshot::new([stocked(ItemType::Needle, 5)], vec![]);
        let mut posting = Posting::new(&snapshot, UserId::new(), Utc::now());
        assert!(matches!(
            posting.post(line(ItemType::Needle, 0), OnMissing::Fail),
            Err(InventoryError::Validation(_))
        ));
    }

    #[test]
    fn lock_order_includes_items_seen_under_reference() {
        let scope = UnitScope {
            items: [ItemType::Needle].into_iter().collect(),
            reference: Some(Reference::event(9)),
            create_missing: false,
        };
        let snapshot = UnitSnapshot::new([stocked(ItemType::Medication, 3)], vec![]);
        let mut posting = Posting::new(&snapshot, UserId::new(), Utc::now());
        posting
            .post(
                PostingLine {
                    reference: Some(&Reference::event(9)),
                    ..line(ItemType::Medication, -1)
                },
                OnMissing::Fail,
            )
            .unwrap();
        let entries = posting.finish().entries;

        assert_eq!(scope.lock_order(&entries), vec![ItemType::Medication, ItemType::Needle]);
    }
}
