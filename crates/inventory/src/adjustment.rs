//! Single-item manual quantity changes (restock, correction, disposal).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::UserId;

use crate::error::{InventoryError, InventoryResult};
use crate::item::ItemType;
use crate::ledger::{AdjustmentReason, Reference};
use crate::unit::{Changeset, OnMissing, Posting, PostingLine, UnitScope, UnitSnapshot};

/// Command: AdjustStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub item_type: ItemType,
    pub delta: Decimal,
    pub reason: AdjustmentReason,
    pub reference: Option<Reference>,
    pub performed_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AdjustStock {
    pub fn new(
        item_type: ItemType,
        delta: Decimal,
        reason: AdjustmentReason,
        performed_by: UserId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            item_type,
            delta,
            reason,
            reference: None,
            performed_by,
            notes: None,
            occurred_at,
        }
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Locks the adjusted item, and the reference when one is given so the
    /// entry cannot interleave with a reversal of the same reference.
    pub fn scope(&self) -> UnitScope {
        UnitScope {
            items: [self.item_type].into_iter().collect(),
            reference: self.reference.clone(),
            create_missing: true,
        }
    }

    pub fn decide(&self, snapshot: &UnitSnapshot) -> InventoryResult<Changeset> {
        if self.delta.is_zero() {
            return Err(InventoryError::validation("delta cannot be zero"));
        }

        let mut posting = Posting::new(snapshot, self.performed_by, self.occurred_at);
        posting.post(
            PostingLine {
                item_type: self.item_type,
                change: self.delta,
                reason: self.reason,
                reference: self.reference.as_ref(),
                notes: self.notes.as_deref(),
            },
            OnMissing::Create,
        )?;
        Ok(posting.finish())
    }
}
