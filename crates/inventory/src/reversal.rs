//! Compensation of an event's consumption when the event is deleted.
//!
//! History is never edited: each item touched under the event reference gets
//! one new `reversal` entry for the outstanding net amount. Once that net is
//! zero, reversing again writes nothing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::UserId;

use crate::error::{InventoryError, InventoryResult};
use crate::item::ItemType;
use crate::ledger::{AdjustmentReason, LedgerEntry, Reference};
use crate::unit::{Changeset, OnMissing, Posting, PostingLine, UnitScope, UnitSnapshot};

/// Net change per item across `entries`, omitting items that net to zero.
pub fn outstanding_by_item(entries: &[LedgerEntry]) -> InventoryResult<BTreeMap<ItemType, Decimal>> {
    let mut net: BTreeMap<ItemType, Decimal> = BTreeMap::new();
    for e in entries {
        let total = net.entry(e.item_type).or_default();
        *total = total.checked_add(e.change_amount).ok_or_else(|| {
            InventoryError::validation(format!("net change of {} overflows", e.item_type))
        })?;
    }
    net.retain(|_, amount| !amount.is_zero());
    Ok(net)
}

/// Command: ReverseEvent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseEvent {
    pub event_id: i64,
    pub performed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl ReverseEvent {
    pub fn reference(&self) -> Reference {
        Reference::event(self.event_id)
    }

    /// Items are discovered from the reference's entries, so none are named
    /// here. Rows deleted since the event are recreated (and locked) first.
    pub fn scope(&self) -> UnitScope {
        UnitScope {
            items: Default::default(),
            reference: Some(self.reference()),
            create_missing: true,
        }
    }

    pub fn decide(&self, snapshot: &UnitSnapshot) -> InventoryResult<Changeset> {
        let reference = self.reference();
        let mut posting = Posting::new(snapshot, self.performed_by, self.occurred_at);

        for (item_type, net) in outstanding_by_item(snapshot.reference_entries())? {
            posting.post(
                PostingLine {
                    item_type,
                    change: -net,
                    reason: AdjustmentReason::Reversal,
                    reference: Some(&reference),
                    notes: None,
                },
                // A deleted item row is recreated so the compensation still lands.
                OnMissing::Create,
            )?;
        }

        Ok(posting.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumption::ConsumeForEvent;
    use crate::item::InventoryItem;

    fn item(item_type: ItemType, qty: i64) -> InventoryItem {
        let mut item = InventoryItem::new(item_type, Utc::now());
        item.quantity = Decimal::from(qty);
        item
    }

    fn consumed(event_id: i64) -> (Vec<InventoryItem>, Vec<LedgerEntry>) {
        let snapshot = UnitSnapshot::new(
            [item(ItemType::Medication, 10), item(ItemType::Syringe, 5)],
            vec![],
        );
        let cmd = ConsumeForEvent {
            event_id,
            performed_by: UserId::new(),
            consumption: [(ItemType::Medication, Decimal::ONE), (ItemType::Syringe, Decimal::ONE)]
                .into_iter()
                .collect(),
            occurred_at: Utc::now(),
        };
        let changes = cmd.decide(&snapshot).unwrap();
        (changes.items, changes.entries)
    }

    fn reverse(event_id: i64) -> ReverseEvent {
        ReverseEvent {
            event_id,
            performed_by: UserId::new(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn reversal_writes_exact_inverse_per_item() {
        let (items, entries) = consumed(501);
        let snapshot = UnitSnapshot::new(items, entries.clone());

        let changes = reverse(501).decide(&snapshot).unwrap();
        assert_eq!(changes.entries.len(), 2);
        assert_eq!(changes.quantity_of(ItemType::Medication), Some(Decimal::from(10)));
        assert_eq!(changes.quantity_of(ItemType::Syringe), Some(Decimal::from(5)));

        for e in &changes.entries {
            assert_eq!(e.reason, AdjustmentReason::Reversal);
            assert_eq!(e.reference, Some(Reference::event(501)));
        }

        let mut all = entries;
        all.extend(changes.entries);
        assert!(outstanding_by_item(&all).unwrap().is_empty());
    }

    #[test]
    fn nothing_to_reverse_is_an_empty_changeset() {
        let changes = reverse(9).decide(&UnitSnapshot::default()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn second_reversal_is_a_no_op() {
        let (items, entries) = consumed(3);
        let first = reverse(3).decide(&UnitSnapshot::new(items, entries.clone())).unwrap();

        let mut all = entries;
        all.extend(first.entries);
        let second = reverse(3).decide(&UnitSnapshot::new(first.items, all)).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn overflowing_net_is_a_validation_error() {
        let (_, mut entries) = consumed(6);
        for e in &mut entries {
            e.change_amount = Decimal::MAX;
        }
        let mut doubled = entries.clone();
        doubled.extend(entries);

        assert!(matches!(
            outstanding_by_item(&doubled),
            Err(InventoryError::Validation(_))
        ));
    }

    #[test]
    fn scope_requests_rows_for_every_item_under_the_event() {
        let (_, entries) = consumed(8);
        let scope = reverse(8).scope();

        assert!(scope.create_missing);
        assert_eq!(
            scope.lock_order(&entries),
            vec![ItemType::Medication, ItemType::Syringe]
        );
    }

    #[test]
    fn deleted_item_row_is_recreated_by_reversal() {
        let (_, entries) = consumed(4);
        let changes = reverse(4).decide(&UnitSnapshot::new(Vec::new(), entries)).unwrap();
        assert_eq!(changes.quantity_of(ItemType::Medication), Some(Decimal::ONE));
    }
}
