//! Derived, read-only stock status views.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::item::{InventoryItem, ItemType, Unit};

/// Low-stock severity policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPolicy {
    /// Fraction of the threshold at or below which stock is critical.
    pub critical_ratio: Decimal,
}

impl Default for StockPolicy {
    fn default() -> Self {
        Self {
            critical_ratio: Decimal::new(5, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    // Declared first so it sorts first.
    Critical,
    Warning,
}

/// An item at or under its low-stock threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCandidate {
    pub item_type: ItemType,
    pub quantity: Decimal,
    pub threshold: Decimal,
    pub unit: Unit,
    pub severity: Severity,
}

/// Items with a threshold set and `quantity <= threshold`, critical first,
/// then by ascending quantity.
pub fn low_stock<'a>(
    items: impl IntoIterator<Item = &'a InventoryItem>,
    policy: &StockPolicy,
) -> Vec<AlertCandidate> {
    let mut alerts: Vec<AlertCandidate> = items
        .into_iter()
        .filter_map(|item| {
            let threshold = item.low_stock_threshold?;
            if item.quantity > threshold {
                return None;
            }
            let critical = threshold
                .checked_mul(policy.critical_ratio)
                .is_none_or(|limit| item.quantity <= limit);
            let severity = if critical {
                Severity::Critical
            } else {
                Severity::Warning
            };
            Some(AlertCandidate {
                item_type: item.item_type,
                quantity: item.quantity,
                threshold,
                unit: item.unit,
                severity,
            })
        })
        .collect();

    alerts.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then(a.quantity.cmp(&b.quantity))
            .then(a.item_type.cmp(&b.item_type))
    });
    alerts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpirationStatus {
    Expired,
    Expiring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationCandidate {
    pub item_type: ItemType,
    pub expiration_date: NaiveDate,
    pub lot_number: Option<String>,
    /// Negative once expired.
    pub days_remaining: i64,
    pub status: ExpirationStatus,
}

/// Items expiring on or before `today + within_days`, including those already
/// past (`Expired`), soonest first.
pub fn expiring<'a>(
    items: impl IntoIterator<Item = &'a InventoryItem>,
    within_days: u32,
    today: NaiveDate,
) -> Vec<ExpirationCandidate> {
    let horizon = i64::from(within_days);
    let mut found: Vec<ExpirationCandidate> = items
        .into_iter()
        .filter_map(|item| {
            let expiration_date = item.expiration_date?;
            let days_remaining = (expiration_date - today).num_days();
            if days_remaining > horizon {
                return None;
            }
            let status = if days_remaining < 0 {
                ExpirationStatus::Expired
            } else {
                ExpirationStatus::Expiring
            };
            Some(ExpirationCandidate {
                item_type: item.item_type,
                expiration_date,
                lot_number: item.lot_number.clone(),
                days_remaining,
                status,
            })
        })
        .collect();

    found.sort_by(|a, b| {
        a.expiration_date
            .cmp(&b.expiration_date)
            .then(a.item_type.cmp(&b.item_type))
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(item_type: ItemType, qty: i64, threshold: Option<i64>) -> InventoryItem {
        let mut item = InventoryItem::new(item_type, Utc::now());
        item.quantity = Decimal::from(qty);
        item.low_stock_threshold = threshold.map(Decimal::from);
        item
    }

    fn dated(item_type: ItemType, date: NaiveDate) -> InventoryItem {
        let mut item = InventoryItem::new(item_type, Utc::now());
        item.expiration_date = Some(date);
        item
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn low_stock_orders_critical_first_then_by_quantity() {
        let items = vec![
            item(ItemType::Medication, 8, Some(10)),
            item(ItemType::Syringe, 2, Some(10)),
            item(ItemType::Needle, 5, Some(10)),
            item(ItemType::AlcoholSwab, 50, Some(10)),
            item(ItemType::Bandage, 0, None),
        ];

        let alerts = low_stock(&items, &StockPolicy::default());
        let order: Vec<_> = alerts.iter().map(|a| (a.item_type, a.severity)).collect();
        assert_eq!(
            order,
            vec![
                (ItemType::Syringe, Severity::Critical),
                (ItemType::Needle, Severity::Critical),
                (ItemType::Medication, Severity::Warning),
            ]
        );
    }

    #[test]
    fn threshold_boundaries_are_inclusive() {
        let items = vec![item(ItemType::Needle, 10, Some(10))];
        let alerts = low_stock(&items, &StockPolicy::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
    }

    #[test]
    fn critical_ratio_is_configurable() {
        let items = vec![item(ItemType::Needle, 5, Some(10))];
        let policy = StockPolicy {
            critical_ratio: Decimal::new(25, 2),
        };
        assert_eq!(low_stock(&items, &policy)[0].severity, Severity::Warning);
    }

    #[test]
    fn expiring_flags_expired_separately_and_skips_far_dates() {
        let today = day(2026, 3, 10);
        let items = vec![
            dated(ItemType::Medication, day(2026, 3, 1)),
            dated(ItemType::Syringe, day(2026, 3, 10)),
            dated(ItemType::Needle, day(2026, 4, 9)),
            dated(ItemType::Bandage, day(2026, 4, 10)),
            item(ItemType::AlcoholSwab, 1, None),
        ];

        let found = expiring(&items, 30, today);
        let summary: Vec<_> = found
            .iter()
            .map(|c| (c.item_type, c.status, c.days_remaining))
            .collect();
        assert_eq!(
            summary,
            vec![
                (ItemType::Medication, ExpirationStatus::Expired, -9),
                (ItemType::Syringe, ExpirationStatus::Expiring, 0),
                (ItemType::Needle, ExpirationStatus::Expiring, 30),
            ]
        );
    }
}
