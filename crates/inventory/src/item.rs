use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

/// Closed set of tracked item types.
///
/// `Medication` is measured by volume; every accessory is a single-use unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Medication,
    Syringe,
    Needle,
    AlcoholSwab,
    Bandage,
}

impl ItemType {
    pub const ALL: [ItemType; 5] = [
        ItemType::Medication,
        ItemType::Syringe,
        ItemType::Needle,
        ItemType::AlcoholSwab,
        ItemType::Bandage,
    ];

    /// Accessories drawn once per administered dose.
    pub const ACCESSORIES: [ItemType; 4] = [
        ItemType::Syringe,
        ItemType::Needle,
        ItemType::AlcoholSwab,
        ItemType::Bandage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Medication => "medication",
            ItemType::Syringe => "syringe",
            ItemType::Needle => "needle",
            ItemType::AlcoholSwab => "alcohol_swab",
            ItemType::Bandage => "bandage",
        }
    }

    pub fn unit(self) -> Unit {
        match self {
            ItemType::Medication => Unit::Volume,
            _ => Unit::Count,
        }
    }
}

impl core::fmt::Display for ItemType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ItemType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| InventoryError::validation(format!("unknown item type: {s}")))
    }
}

/// Unit tag paired with a quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Volume,
    Count,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Volume => "volume",
            Unit::Count => "count",
        }
    }
}

impl core::str::FromStr for Unit {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "volume" => Ok(Unit::Volume),
            "count" => Ok(Unit::Count),
            other => Err(InventoryError::validation(format!("unknown unit: {other}"))),
        }
    }
}

/// Current state of one tracked item type.
///
/// The quantity is a cached projection of the ledger; it only changes through
/// ledger-producing operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub item_type: ItemType,
    pub quantity: Decimal,
    pub unit: Unit,
    pub low_stock_threshold: Option<Decimal>,
    pub expiration_date: Option<NaiveDate>,
    pub lot_number: Option<String>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// A fresh row at quantity zero (lazy creation on first adjustment).
    pub fn new(item_type: ItemType, at: DateTime<Utc>) -> Self {
        Self {
            item_type,
            quantity: Decimal::ZERO,
            unit: item_type.unit(),
            low_stock_threshold: None,
            expiration_date: None,
            lot_number: None,
            notes: None,
            updated_at: at,
        }
    }

    /// Replace the descriptive metadata, leaving quantity untouched.
    pub fn apply_details(&mut self, details: ItemDetails, at: DateTime<Utc>) {
        self.low_stock_threshold = details.low_stock_threshold;
        self.expiration_date = details.expiration_date;
        self.lot_number = details.lot_number;
        self.notes = details.notes;
        self.updated_at = at;
    }

    pub fn ensure_non_negative(&self) -> Result<(), InventoryError> {
        if self.quantity < Decimal::ZERO {
            return Err(InventoryError::validation(format!(
                "{} quantity cannot be negative ({})",
                self.item_type, self.quantity
            )));
        }
        if matches!(self.low_stock_threshold, Some(t) if t < Decimal::ZERO) {
            return Err(InventoryError::validation(format!(
                "{} low-stock threshold cannot be negative",
                self.item_type
            )));
        }
        Ok(())
    }
}

/// Admin-editable metadata of an item (everything except quantity).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub low_stock_threshold: Option<Decimal>,
    pub expiration_date: Option<NaiveDate>,
    pub lot_number: Option<String>,
    pub notes: Option<String>,
}
