//! In-process ledger facade.
//!
//! Collaborators (event scheduling, admin screens, alert jobs) call this
//! service. Each mutating operation builds a `StockCommand` and hands it to
//! the store as one unit of work:
//!
//! ```text
//! adjust / consume / reverse
//!   ↓
//! StockCommand (validated inputs, timestamp, actor)
//!   ↓
//! InventoryStore::execute  (lock → snapshot → decide → commit)
//!   ↓
//! appended LedgerEntry rows
//! ```
//!
//! Reads (`low_stock`, `expiring`, `history`, `reconcile`) go straight to the
//! store and never lock.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use stockledger_core::UserId;
use stockledger_inventory::{
    AdjustStock, AdjustmentReason, AlertCandidate, ConsumeForEvent, ConsumptionProfile,
    ExpirationCandidate, InventoryError, InventoryItem, InventoryResult, ItemDetails, ItemType,
    LedgerEntry, LedgerQuery, ReconciliationReport, ReverseEvent, StockCommand, StockPolicy,
    expiring, low_stock, reconcile_all,
};

use crate::config::LedgerConfig;
use crate::store::InventoryStore;

/// The inventory ledger over some `InventoryStore`.
#[derive(Debug)]
pub struct InventoryLedger<S> {
    store: S,
    policy: StockPolicy,
    profile: ConsumptionProfile,
    expiry_window_days: u32,
}

impl<S> InventoryLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: StockPolicy::default(),
            profile: ConsumptionProfile::default(),
            expiry_window_days: LedgerConfig::default().expiry_window_days,
        }
    }

    pub fn from_config(store: S, config: &LedgerConfig) -> Self {
        Self::new(store)
            .with_policy(config.stock_policy)
            .with_expiry_window_days(config.expiry_window_days)
    }

    pub fn with_policy(mut self, policy: StockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_profile(mut self, profile: ConsumptionProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_expiry_window_days(mut self, days: u32) -> Self {
        self.expiry_window_days = days;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn profile(&self) -> &ConsumptionProfile {
        &self.profile
    }
}

impl<S> InventoryLedger<S>
where
    S: InventoryStore,
{
    /// Apply a signed change to one item; returns the new quantity.
    #[instrument(
        skip(self, adjustment),
        fields(
            item_type = %adjustment.item_type,
            delta = %adjustment.delta,
            reason = %adjustment.reason
        ),
        err
    )]
    pub async fn adjust(&self, adjustment: AdjustStock) -> InventoryResult<Decimal> {
        let item_type = adjustment.item_type;
        let entries = self
            .run(StockCommand::from(adjustment))
            .await?;

        let entry = entries
            .iter()
            .rev()
            .find(|e| e.item_type == item_type)
            .ok_or_else(|| InventoryError::aborted("adjustment committed without an entry"))?;

        info!(quantity = %entry.quantity_after, "stock adjusted");
        Ok(entry.quantity_after)
    }

    /// `adjust` for callers holding raw names (admin forms, job payloads).
    ///
    /// An unknown reason fails with `InvalidReason` before anything is locked.
    pub async fn adjust_named(
        &self,
        item_type: &str,
        delta: Decimal,
        reason: &str,
        performed_by: UserId,
        notes: Option<String>,
    ) -> InventoryResult<Decimal> {
        let item_type: ItemType = item_type.parse()?;
        let reason: AdjustmentReason = reason.parse()?;

        let mut adjustment = AdjustStock::new(item_type, delta, reason, performed_by, Utc::now());
        adjustment.notes = notes;
        self.adjust(adjustment).await
    }

    /// Admin initial-setup restock.
    pub async fn initialize(
        &self,
        item_type: ItemType,
        quantity: Decimal,
        performed_by: UserId,
    ) -> InventoryResult<Decimal> {
        if quantity <= Decimal::ZERO {
            return Err(InventoryError::validation(
                "initial quantity must be positive",
            ));
        }
        let adjustment = AdjustStock::new(
            item_type,
            quantity,
            AdjustmentReason::InitialSetup,
            performed_by,
            Utc::now(),
        );
        self.adjust(adjustment).await
    }

    /// Decrement every item in `consumption` for one event, all or nothing.
    #[instrument(skip(self, consumption), fields(items = consumption.len()), err)]
    pub async fn consume(
        &self,
        event_id: i64,
        performed_by: UserId,
        consumption: &BTreeMap<ItemType, Decimal>,
    ) -> InventoryResult<()> {
        let command = ConsumeForEvent {
            event_id,
            performed_by,
            consumption: consumption.clone(),
            occurred_at: Utc::now(),
        };
        let entries = self.run(StockCommand::from(command)).await?;

        info!(entries = entries.len(), "event consumption recorded");
        Ok(())
    }

    /// Consume one standard dose: `volume` of medication plus the profile's
    /// accessories.
    pub async fn consume_dose(
        &self,
        event_id: i64,
        performed_by: UserId,
        volume: Decimal,
    ) -> InventoryResult<()> {
        let consumption = self.profile.dose(volume);
        self.consume(event_id, performed_by, &consumption).await
    }

    /// Restore whatever the event still has outstanding; returns the number of
    /// compensating entries (zero when there was nothing to reverse).
    #[instrument(skip(self), err)]
    pub async fn reverse(&self, event_id: i64, performed_by: UserId) -> InventoryResult<usize> {
        let command = ReverseEvent {
            event_id,
            performed_by,
            occurred_at: Utc::now(),
        };
        let entries = self.run(StockCommand::from(command)).await?;

        if entries.is_empty() {
            info!("nothing to reverse");
        } else {
            info!(entries = entries.len(), "event consumption reversed");
        }
        Ok(entries.len())
    }

    pub async fn get(&self, item_type: ItemType) -> InventoryResult<InventoryItem> {
        self.store
            .get(item_type)
            .await?
            .ok_or(InventoryError::ItemNotFound { item_type })
    }

    pub async fn list(&self) -> InventoryResult<Vec<InventoryItem>> {
        Ok(self.store.list().await?)
    }

    /// Edit threshold, expiration, lot and notes. Quantity is untouched and no
    /// ledger entry is written.
    #[instrument(skip(self, details), err)]
    pub async fn update_details(
        &self,
        item_type: ItemType,
        details: ItemDetails,
    ) -> InventoryResult<InventoryItem> {
        if matches!(details.low_stock_threshold, Some(t) if t < Decimal::ZERO) {
            return Err(InventoryError::validation(
                "low-stock threshold cannot be negative",
            ));
        }
        let item = self
            .store
            .update_details(item_type, details, Utc::now())
            .await?;
        info!("item details updated");
        Ok(item)
    }

    /// Remove an item row. Its ledger history stays.
    #[instrument(skip(self), err)]
    pub async fn delete(&self, item_type: ItemType) -> InventoryResult<bool> {
        let removed = self.store.delete(item_type).await?;
        if removed {
            info!("item row deleted");
        }
        Ok(removed)
    }

    pub async fn history(&self, query: &LedgerQuery) -> InventoryResult<Vec<LedgerEntry>> {
        Ok(self.store.ledger(query).await?)
    }

    pub async fn low_stock(&self) -> InventoryResult<Vec<AlertCandidate>> {
        let items = self.store.list().await?;
        Ok(low_stock(&items, &self.policy))
    }

    pub async fn expiring(&self, within_days: u32) -> InventoryResult<Vec<ExpirationCandidate>> {
        self.expiring_as_of(within_days, Utc::now().date_naive()).await
    }

    /// `expiring` over the configured window.
    pub async fn expiring_soon(&self) -> InventoryResult<Vec<ExpirationCandidate>> {
        self.expiring(self.expiry_window_days).await
    }

    pub async fn expiring_as_of(
        &self,
        within_days: u32,
        today: NaiveDate,
    ) -> InventoryResult<Vec<ExpirationCandidate>> {
        let items = self.store.list().await?;
        Ok(expiring(&items, within_days, today))
    }

    /// Replay the ledger against the item rows.
    ///
    /// Rows and ledger are read separately, so run this while writes are quiet
    /// or expect transient drift.
    #[instrument(skip(self), err)]
    pub async fn reconcile(&self) -> InventoryResult<Vec<ReconciliationReport>> {
        let items = self.store.list().await?;
        let entries = self.store.ledger(&LedgerQuery::all()).await?;
        let reports = reconcile_all(&items, &entries);

        for report in reports.iter().filter(|r| !r.is_consistent()) {
            error!(
                item_type = %report.item_type,
                recorded = ?report.recorded,
                replayed = %report.replayed,
                drift = %report.drift(),
                unbalanced = report.unbalanced_entries,
                chain_breaks = report.chain_breaks,
                "ledger drift detected"
            );
        }
        Ok(reports)
    }

    async fn run(&self, command: StockCommand) -> InventoryResult<Vec<LedgerEntry>> {
        match self.store.execute(&command).await {
            Ok(entries) => Ok(entries),
            Err(err) => {
                log_refusal(command.kind(), &err);
                Err(err)
            }
        }
    }
}

fn log_refusal(kind: &'static str, err: &InventoryError) {
    match err {
        InventoryError::InsufficientStock {
            item_type,
            available,
            requested,
        } => warn!(
            kind,
            item_type = %item_type,
            available = %available,
            requested = %requested,
            "insufficient stock"
        ),
        InventoryError::TransactionAborted(reason) => {
            error!(kind, reason = %reason, "unit of work aborted")
        }
        other => warn!(kind, error = %other, "stock command refused"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryInventoryStore;

    fn ledger() -> InventoryLedger<InMemoryInventoryStore> {
        InventoryLedger::new(InMemoryInventoryStore::new())
    }

    #[tokio::test]
    async fn adjust_returns_new_quantity() {
        let ledger = ledger();
        let user = UserId::new();

        let qty = ledger
            .initialize(ItemType::Syringe, Decimal::from(20), user)
            .await
            .unwrap();
        assert_eq!(qty, Decimal::from(20));

        let qty = ledger
            .adjust(AdjustStock::new(
                ItemType::Syringe,
                Decimal::from(-4),
                AdjustmentReason::Damaged,
                user,
                Utc::now(),
            ))
            .await
            .unwrap();
        assert_eq!(qty, Decimal::from(16));
    }

    #[tokio::test]
    async fn unknown_reason_is_refused_before_any_write() {
        let ledger = ledger();
        let err = ledger
            .adjust_named("needle", Decimal::from(5), "gift", UserId::new(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, InventoryError::InvalidReason(_)));
        assert!(ledger.history(&LedgerQuery::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn adjust_named_parses_item_and_reason() {
        let ledger = ledger();
        let qty = ledger
            .adjust_named(
                "alcohol_swab",
                Decimal::from(100),
                "restock",
                UserId::new(),
                Some("box of 100".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(qty, Decimal::from(100));

        let history = ledger.history(&LedgerQuery::for_item(ItemType::AlcoholSwab)).await.unwrap();
        assert_eq!(history[0].notes.as_deref(), Some("box of 100"));
    }

    #[tokio::test]
    async fn get_missing_item_is_not_found() {
        let err = ledger().get(ItemType::Bandage).await.unwrap_err();
        assert_eq!(err, InventoryError::ItemNotFound { item_type: ItemType::Bandage });
    }

    #[tokio::test]
    async fn update_details_rejects_negative_threshold() {
        let details = ItemDetails {
            low_stock_threshold: Some(Decimal::from(-1)),
            ..ItemDetails::default()
        };
        let err = ledger().update_details(ItemType::Needle, details).await.unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[tokio::test]
    async fn low_stock_uses_configured_policy() {
        let ledger = ledger().with_policy(StockPolicy {
            critical_ratio: Decimal::new(25, 2),
        });
        let user = UserId::new();
        ledger.initialize(ItemType::Needle, Decimal::from(4), user).await.unwrap();
        ledger
            .update_details(
                ItemType::Needle,
                ItemDetails {
                    low_stock_threshold: Some(Decimal::from(10)),
                    ..ItemDetails::default()
                },
            )
            .await
            .unwrap();

        let alerts = ledger.low_stock().await.unwrap();
        assert_eq!(alerts.len(), 1);
        // 4 <= 10 but above 10 * 0.25.
        assert_eq!(alerts[0].severity, stockledger_inventory::Severity::Warning);
    }

    #[tokio::test]
    async fn expiring_reads_item_dates() {
        let ledger = ledger();
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        ledger
            .update_details(
                ItemType::Medication,
                ItemDetails {
                    expiration_date: NaiveDate::from_ymd_opt(2026, 3, 10),
                    lot_number: Some("M-77".to_string()),
                    ..ItemDetails::default()
                },
            )
            .await
            .unwrap();

        assert!(ledger.expiring_as_of(5, today).await.unwrap().is_empty());
        let found = ledger.expiring_as_of(30, today).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].days_remaining, 9);
    }

    #[tokio::test]
    async fn configured_window_drives_expiring_soon() {
        let config = LedgerConfig::default()
            .with_expiry_window_days(10)
            .with_stock_policy(StockPolicy {
                critical_ratio: Decimal::ONE,
            });
        let ledger = InventoryLedger::from_config(InMemoryInventoryStore::new(), &config);
        let today = Utc::now().date_naive();

        for (item_type, days) in [(ItemType::Medication, 5), (ItemType::Syringe, 20)] {
            ledger
                .update_details(
                    item_type,
                    ItemDetails {
                        expiration_date: Some(today + chrono::Days::new(days)),
                        low_stock_threshold: Some(Decimal::from(3)),
                        ..ItemDetails::default()
                    },
                )
                .await
                .unwrap();
        }

        let soon = ledger.expiring_soon().await.unwrap();
        assert_eq!(soon.len(), 1);
        assert_eq!(soon[0].item_type, ItemType::Medication);

        // Ratio 1: anything at or under threshold is critical.
        let alerts = ledger.low_stock().await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.severity == stockledger_inventory::Severity::Critical));
    }

    #[tokio::test]
    async fn delete_keeps_history() {
        let ledger = ledger();
        ledger.initialize(ItemType::Bandage, Decimal::from(3), UserId::new()).await.unwrap();

        assert!(ledger.delete(ItemType::Bandage).await.unwrap());
        assert!(!ledger.delete(ItemType::Bandage).await.unwrap());
        assert_eq!(ledger.history(&LedgerQuery::all()).await.unwrap().len(), 1);
    }
}
