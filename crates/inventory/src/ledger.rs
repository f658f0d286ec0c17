//! Append-only stock ledger records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{LedgerEntryId, UserId};

use crate::error::InventoryError;
use crate::item::ItemType;

/// Why a quantity changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    EventConsumption,
    ManualAdjustment,
    Restock,
    Correction,
    Expired,
    Damaged,
    InitialSetup,
    Reversal,
}

impl AdjustmentReason {
    pub const ALL: [AdjustmentReason; 8] = [
        AdjustmentReason::EventConsumption,
        AdjustmentReason::ManualAdjustment,
        AdjustmentReason::Restock,
        AdjustmentReason::Correction,
        AdjustmentReason::Expired,
        AdjustmentReason::Damaged,
        AdjustmentReason::InitialSetup,
        AdjustmentReason::Reversal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AdjustmentReason::EventConsumption => "event_consumption",
            AdjustmentReason::ManualAdjustment => "manual_adjustment",
            AdjustmentReason::Restock => "restock",
            AdjustmentReason::Correction => "correction",
            AdjustmentReason::Expired => "expired",
            AdjustmentReason::Damaged => "damaged",
            AdjustmentReason::InitialSetup => "initial_setup",
            AdjustmentReason::Reversal => "reversal",
        }
    }
}

impl core::fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AdjustmentReason {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdjustmentReason::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| InventoryError::InvalidReason(s.to_string()))
    }
}

/// Link from a ledger entry to the external entity that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub reference_type: String,
    pub reference_id: i64,
}

impl Reference {
    /// Reference type used for clinical events.
    pub const EVENT: &'static str = "event";

    pub fn new(reference_type: impl Into<String>, reference_id: i64) -> Self {
        Self {
            reference_type: reference_type.into(),
            reference_id,
        }
    }

    pub fn event(event_id: i64) -> Self {
        Self::new(Self::EVENT, event_id)
    }

    /// Stable key for lock tables (`event:501`).
    pub fn lock_key(&self) -> String {
        format!("{}:{}", self.reference_type, self.reference_id)
    }
}

impl core::fmt::Display for Reference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.reference_type, self.reference_id)
    }
}

/// One immutable quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub item_type: ItemType,
    pub change_amount: Decimal,
    pub quantity_before: Decimal,
    pub quantity_after: Decimal,
    pub reason: AdjustmentReason,
    pub reference: Option<Reference>,
    pub performed_by: UserId,
    pub recorded_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl LedgerEntry {
    /// `quantity_after == quantity_before + change_amount`.
    pub fn is_balanced(&self) -> bool {
        self.quantity_before.checked_add(self.change_amount) == Some(self.quantity_after)
    }

    pub fn refers_to(&self, reference: &Reference) -> bool {
        self.reference.as_ref() == Some(reference)
    }
}

/// History filter.
///
/// Results are ordered oldest first; `limit` keeps the most recent entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerQuery {
    pub item_type: Option<ItemType>,
    pub reference: Option<Reference>,
    pub limit: Option<usize>,
}

impl LedgerQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_item(item_type: ItemType) -> Self {
        Self {
            item_type: Some(item_type),
            ..Self::default()
        }
    }

    pub fn for_reference(reference: Reference) -> Self {
        Self {
            reference: Some(reference),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if matches!(self.item_type, Some(t) if t != entry.item_type) {
            return false;
        }
        match &self.reference {
            Some(r) => entry.refers_to(r),
            None => true,
        }
    }

    /// Apply the filter and limit to entries already in ledger order.
    pub fn select<'a>(&self, entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Vec<LedgerEntry> {
        let mut selected: Vec<LedgerEntry> =
            entries.into_iter().filter(|e| self.matches(e)).cloned().collect();
        if let Some(limit) = self.limit {
            let skip = selected.len().saturating_sub(limit);
            selected.drain(..skip);
        }
        selected
    }
}
