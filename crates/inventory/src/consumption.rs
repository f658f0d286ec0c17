//! Atomic multi-item decrement tied to one clinical event.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::UserId;

use crate::error::{InventoryError, InventoryResult};
use crate::item::ItemType;
use crate::ledger::{AdjustmentReason, Reference};
use crate::reversal::outstanding_by_item;
use crate::unit::{Changeset, OnMissing, Posting, PostingLine, UnitScope, UnitSnapshot};

/// Command: ConsumeForEvent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeForEvent {
    pub event_id: i64,
    pub performed_by: UserId,
    pub consumption: BTreeMap<ItemType, Decimal>,
    pub occurred_at: DateTime<Utc>,
}

impl ConsumeForEvent {
    pub fn reference(&self) -> Reference {
        Reference::event(self.event_id)
    }

    pub fn scope(&self) -> UnitScope {
        UnitScope {
            items: self.consumption.keys().copied().collect(),
            reference: Some(self.reference()),
            create_missing: false,
        }
    }

    /// Validate every line against the snapshot, then stage every decrement.
    ///
    /// No line is staged until all of them have passed, so the first failure
    /// (in item order) is reported with nothing written.
    pub fn decide(&self, snapshot: &UnitSnapshot) -> InventoryResult<Changeset> {
        if self.consumption.is_empty() {
            return Err(InventoryError::validation("consumption must name at least one item"));
        }
        if let Some((item_type, amount)) = self.consumption.iter().find(|(_, a)| **a <= Decimal::ZERO) {
            return Err(InventoryError::validation(format!(
                "consumption of {item_type} must be positive (got {amount})"
            )));
        }

        let outstanding = outstanding_by_item(snapshot.reference_entries())?;
        if !outstanding.is_empty() {
            return Err(InventoryError::conflict(format!(
                "event {} already has unreversed consumption",
                self.event_id
            )));
        }

        // Phase 1: validate all.
        for (&item_type, &amount) in &self.consumption {
            let item = snapshot
                .item(item_type)
                .ok_or(InventoryError::ItemNotFound { item_type })?;
            if item.quantity < amount {
                return Err(InventoryError::InsufficientStock {
                    item_type,
                    available: item.quantity,
                    requested: amount,
                });
            }
        }

        // Phase 2: apply all.
        let reference = self.reference();
        let mut posting = Posting::new(snapshot, self.performed_by, self.occurred_at);
        for (&item_type, &amount) in &self.consumption {
            posting.post(
                PostingLine {
                    item_type,
                    change: -amount,
                    reason: AdjustmentReason::EventConsumption,
                    reference: Some(&reference),
                    notes: None,
                },
                OnMissing::Fail,
            )?;
        }
        Ok(posting.finish())
    }
}

/// Fixed per-event amounts drawn by one administered dose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionProfile {
    /// Units of each accessory used per dose.
    pub accessories_per_dose: BTreeMap<ItemType, Decimal>,
}

impl Default for ConsumptionProfile {
    fn default() -> Self {
        Self {
            accessories_per_dose: ItemType::ACCESSORIES
                .into_iter()
                .map(|t| (t, Decimal::ONE))
                .collect(),
        }
    }
}

impl ConsumptionProfile {
    /// Override (or with zero, drop) the per-dose amount of one accessory.
    pub fn with_accessory(mut self, item_type: ItemType, amount: Decimal) -> Self {
        if amount.is_zero() {
            self.accessories_per_dose.remove(&item_type);
        } else {
            self.accessories_per_dose.insert(item_type, amount);
        }
        self
    }

    /// Consumption map for one dose of `volume` medication.
    pub fn dose(&self, volume: Decimal) -> BTreeMap<ItemType, Decimal> {
        let mut map = self.accessories_per_dose.clone();
        map.insert(ItemType::Medication, volume);
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::InventoryItem;
    use crate::ledger::LedgerEntry;

    fn item(item_type: ItemType, qty: Decimal) -> InventoryItem {
        let mut item = InventoryItem::new(item_type, Utc::now());
        item.quantity = qty;
        item
    }

    fn consume(event_id: i64, lines: &[(ItemType, Decimal)]) -> ConsumeForEvent {
        ConsumeForEvent {
            event_id,
            performed_by: UserId::new(),
            consumption: lines.iter().copied().collect(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn insufficient_accessory_fails_before_anything_is_staged() {
        let snapshot = UnitSnapshot::new(
            [
                item(ItemType::Medication, Decimal::from(10)),
                item(ItemType::Syringe, Decimal::from(3)),
                item(ItemType::Needle, Decimal::new(5, 1)),
            ],
            vec![],
        );
        let cmd = consume(
            501,
            &[
                (ItemType::Medication, Decimal::ONE),
                (ItemType::Syringe, Decimal::ONE),
                (ItemType::Needle, Decimal::ONE),
            ],
        );

        let err = cmd.decide(&snapshot).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                item_type: ItemType::Needle,
                available: Decimal::new(5, 1),
                requested: Decimal::ONE,
            }
        );
    }

    #[test]
    fn missing_item_is_not_created() {
        let snapshot = UnitSnapshot::new([item(ItemType::Medication, Decimal::from(10))], vec![]);
        let cmd = consume(
            1,
            &[(ItemType::Medication, Decimal::ONE), (ItemType::Bandage, Decimal::ONE)],
        );
        assert_eq!(
            cmd.decide(&snapshot).unwrap_err(),
            InventoryError::ItemNotFound { item_type: ItemType::Bandage }
        );
    }

    #[test]
    fn success_decrements_every_item_with_event_reference() {
        let snapshot = UnitSnapshot::new(
            [
                item(ItemType::Medication, Decimal::from(10)),
                item(ItemType::Syringe, Decimal::from(3)),
            ],
            vec![],
        );
        let cmd = consume(
            42,
            &[(ItemType::Medication, Decimal::new(15, 1)), (ItemType::Syringe, Decimal::ONE)],
        );

        let changes = cmd.decide(&snapshot).unwrap();
        assert_eq!(changes.quantity_of(ItemType::Medication), Some(Decimal::new(85, 1)));
        assert_eq!(changes.quantity_of(ItemType::Syringe), Some(Decimal::from(2)));
        assert_eq!(changes.entries.len(), 2);
        for e in &changes.entries {
            assert_eq!(e.reason, AdjustmentReason::EventConsumption);
            assert_eq!(e.reference, Some(Reference::event(42)));
            assert!(e.change_amount < Decimal::ZERO);
        }
    }

    #[test]
    fn empty_and_non_positive_consumption_are_rejected() {
        let snapshot = UnitSnapshot::default();
        assert!(matches!(consume(1, &[]).decide(&snapshot), Err(InventoryError::Validation(_))));
        assert!(matches!(
            consume(1, &[(ItemType::Needle, Decimal::ZERO)]).decide(&snapshot),
            Err(InventoryError::Validation(_))
        ));
    }

    #[test]
    fn event_with_outstanding_consumption_conflicts() {
        let first = consume(7, &[(ItemType::Needle, Decimal::ONE)]);
        let snapshot = UnitSnapshot::new([item(ItemType::Needle, Decimal::from(5))], vec![]);
        let prior: Vec<LedgerEntry> = first.decide(&snapshot).unwrap().entries;

        let retry = UnitSnapshot::new([item(ItemType::Needle, Decimal::from(4))], prior);
        assert!(matches!(first.decide(&retry), Err(InventoryError::Conflict(_))));
    }

    #[test]
    fn default_profile_draws_one_of_each_accessory() {
        let dose = ConsumptionProfile::default()
            .with_accessory(ItemType::Bandage, Decimal::ZERO)
            .dose(Decimal::new(25, 1));

        assert_eq!(dose.get(&ItemType::Medication), Some(&Decimal::new(25, 1)));
        assert_eq!(dose.get(&ItemType::Syringe), Some(&Decimal::ONE));
        assert_eq!(dose.get(&ItemType::Bandage), None);
        assert_eq!(dose.len(), 4);
    }
}
