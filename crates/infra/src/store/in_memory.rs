use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockledger_inventory::{
    InventoryError, InventoryItem, ItemDetails, ItemType, LedgerEntry, LedgerQuery, Reference, StockCommand,
    UnitScope, UnitSnapshot,
};

use super::r#trait::{InventoryStore, StoreError};

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Aborted("lock poisoned".to_string())
}

/// In-memory item rows and ledger.
///
/// Intended for tests/dev. Each item type has its own row mutex (the set is
/// closed, so rows are allocated up front) and each reference gets a mutex on
/// first use. A unit of work locks the reference, then its rows in ascending
/// item-type order, then the ledger for the append, and never awaits while
/// holding any of them.
#[derive(Debug)]
pub struct InMemoryInventoryStore {
    rows: BTreeMap<ItemType, Mutex<Option<InventoryItem>>>,
    ledger: RwLock<Vec<LedgerEntry>>,
    reference_locks: Mutex<HashMap<Reference, Arc<Mutex<()>>>>,
    #[cfg(test)]
    fail_next_commit: AtomicBool,
}

impl Default for InMemoryInventoryStore {
    fn default() -> Self {
        Self {
            rows: ItemType::ALL.into_iter().map(|t| (t, Mutex::new(None))).collect(),
            ledger: RwLock::new(Vec::new()),
            reference_locks: Mutex::new(HashMap::new()),
            #[cfg(test)]
            fail_next_commit: AtomicBool::new(false),
        }
    }
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next unit of work fail at commit time, after it has decided.
    #[cfg(test)]
    pub(crate) fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn row(&self, item_type: ItemType) -> Result<MutexGuard<'_, Option<InventoryItem>>, StoreError> {
        self.rows
            .get(&item_type)
            .ok_or_else(|| StoreError::Corrupt(format!("no row slot for {item_type}")))?
            .lock()
            .map_err(poisoned)
    }

    fn reference_lock(&self, reference: &Reference) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self.reference_locks.lock().map_err(poisoned)?;
        Ok(locks.entry(reference.clone()).or_default().clone())
    }

    /// Drop the reference's mutex once no unit holds or waits on it.
    fn release_reference(&self, reference: &Reference) -> Result<(), StoreError> {
        let mut locks = self.reference_locks.lock().map_err(poisoned)?;
        if locks.get(reference).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(reference);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn tracked_references(&self) -> usize {
        self.reference_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    fn execute_unit(&self, command: &StockCommand) -> Result<Vec<LedgerEntry>, InventoryError> {
        let scope = command.scope();
        let Some(reference) = &scope.reference else {
            return self.run_locked(command, &scope);
        };

        // 1) Serialize on the reference.
        let lock = self.reference_lock(reference)?;
        let result = match lock.lock() {
            Ok(_guard) => self.run_locked(command, &scope),
            Err(e) => Err(poisoned(e).into()),
        };
        drop(lock);
        self.release_reference(reference)?;
        result
    }

    fn run_locked(
        &self,
        command: &StockCommand,
        scope: &UnitScope,
    ) -> Result<Vec<LedgerEntry>, InventoryError> {
        let reference_entries: Vec<LedgerEntry> = match &scope.reference {
            Some(reference) => {
                let ledger = self.ledger.read().map_err(poisoned)?;
                ledger.iter().filter(|e| e.refers_to(reference)).cloned().collect()
            }
            None => Vec::new(),
        };

        // 2) Lock rows in ascending order.
        let lock_order = scope.lock_order(&reference_entries);
        let mut guards = Vec::with_capacity(lock_order.len());
        for item_type in &lock_order {
            guards.push((*item_type, self.row(*item_type)?));
        }

        // 3) Decide against the locked snapshot.
        let snapshot = UnitSnapshot::new(
            guards.iter().filter_map(|(_, row)| (**row).clone()),
            reference_entries,
        );
        let changes = command.decide(&snapshot)?;
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        for item in &changes.items {
            item.ensure_non_negative()
                .map_err(|e| StoreError::Constraint(e.to_string()))?;
            if !lock_order.contains(&item.item_type) {
                return Err(StoreError::Aborted(format!(
                    "decision wrote {} outside its locked rows",
                    item.item_type
                ))
                .into());
            }
        }

        #[cfg(test)]
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Aborted("injected commit failure".to_string()).into());
        }

        // 4) Commit: rows and ledger together, while every lock is still held.
        let mut ledger = self.ledger.write().map_err(poisoned)?;
        for item in changes.items {
            if let Some((_, row)) = guards.iter_mut().find(|(t, _)| *t == item.item_type) {
                **row = Some(item);
            }
        }
        ledger.extend(changes.entries.iter().cloned());

        Ok(changes.entries)
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get(&self, item_type: ItemType) -> Result<Option<InventoryItem>, StoreError> {
        Ok(self.row(item_type)?.clone())
    }

    async fn upsert(&self, item: InventoryItem) -> Result<(), StoreError> {
        item.ensure_non_negative()
            .map_err(|e| StoreError::Constraint(e.to_string()))?;
        let item_type = item.item_type;
        *self.row(item_type)? = Some(item);
        Ok(())
    }

    async fn update_details(
        &self,
        item_type: ItemType,
        details: ItemDetails,
        at: DateTime<Utc>,
    ) -> Result<InventoryItem, StoreError> {
        let mut row = self.row(item_type)?;
        let mut item = row.clone().unwrap_or_else(|| InventoryItem::new(item_type, at));
        item.apply_details(details, at);
        item.ensure_non_negative()
            .map_err(|e| StoreError::Constraint(e.to_string()))?;
        *row = Some(item.clone());
        Ok(item)
    }

    async fn list(&self) -> Result<Vec<InventoryItem>, StoreError> {
        let mut items = Vec::new();
        for item_type in ItemType::ALL {
            if let Some(item) = self.row(item_type)?.clone() {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn delete(&self, item_type: ItemType) -> Result<bool, StoreError> {
        Ok(self.row(item_type)?.take().is_some())
    }

    async fn ledger(&self, query: &LedgerQuery) -> Result<Vec<LedgerEntry>, StoreError> {
        let ledger = self.ledger.read().map_err(poisoned)?;
        Ok(query.select(ledger.iter()))
    }

    async fn execute(&self, command: &StockCommand) -> Result<Vec<LedgerEntry>, InventoryError> {
        self.execute_unit(command)
    }
}
