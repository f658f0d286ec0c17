//! Postgres-backed item rows and ledger.
//!
//! ## Locking
//!
//! `execute()` runs each command in one transaction:
//!
//! | Step | Statement | Purpose |
//! |------|-----------|---------|
//! | 1 | `pg_advisory_xact_lock(hashtextextended('event:501', 0))` | serialize units on one reference |
//! | 2 | `SELECT … FROM ledger_entries WHERE reference_* = …` | entries already under the reference |
//! | 3 | `INSERT … ON CONFLICT DO NOTHING` | lazily created rows (adjust, reverse) |
//! | 4 | `SELECT … FOR UPDATE ORDER BY item_type` | row locks, same order in every unit |
//! | 5 | upsert rows, insert entries, `COMMIT` | all or nothing |
//!
//! Any error before `COMMIT` rolls the transaction back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | SQLSTATE | StoreError |
//! |------------|----------|------------|
//! | Database (serialization / deadlock / lock timeout) | `40001`, `40P01`, `55P03` | `Conflict` |
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (check violation) | `23514` | `Constraint` |
//! | Database (other) | any | `Aborted` |
//! | PoolClosed / PoolTimedOut / Io | n/a | `Unavailable` |
//! | ColumnDecode / Decode | n/a | `Corrupt` |
//! | Other | n/a | `Aborted` |

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use stockledger_core::{LedgerEntryId, UserId};
use stockledger_inventory::{
    AdjustmentReason, InventoryError, InventoryItem, ItemDetails, ItemType, LedgerEntry, LedgerQuery,
    Reference, StockCommand, Unit, UnitSnapshot,
};

use super::r#trait::{InventoryStore, StoreError};
use crate::config::LedgerConfig;

const SCHEMA: &str = include_str!("../../migrations/0001_inventory_ledger.sql");

const ITEM_COLUMNS: &str = "item_type, quantity, unit, low_stock_threshold, expiration_date, \
                            lot_number, notes, updated_at";

const ENTRY_COLUMNS: &str = "id, item_type, change_amount, quantity_before, quantity_after, \
                             reason, reference_type, reference_id, performed_by, recorded_at, notes";

/// Postgres-backed `InventoryStore`.
///
/// `Send + Sync`; all access goes through the SQLx pool.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool sized by `config`.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, StoreError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("DATABASE_URL is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Ok(Self::new(pool))
    }

    /// Create tables, indexes and the append-only trigger if missing.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn run_unit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        command: &StockCommand,
    ) -> Result<Vec<LedgerEntry>, InventoryError> {
        let scope = command.scope();

        let reference_entries = match &scope.reference {
            Some(reference) => {
                sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                    .bind(reference.lock_key())
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("lock_reference", e))?;
                select_entries(&mut **tx, &LedgerQuery::for_reference(reference.clone())).await?
            }
            None => Vec::new(),
        };

        let lock_order = scope.lock_order(&reference_entries);

        // Missing rows are created before locking so that every row the unit
        // writes is one it holds `FOR UPDATE`.
        if scope.create_missing {
            for item_type in &lock_order {
                sqlx::query(
                    r#"
                    INSERT INTO inventory_items (item_type, quantity, unit)
                    VALUES ($1, 0, $2)
                    ON CONFLICT (item_type) DO NOTHING
                    "#,
                )
                .bind(item_type.as_str())
                .bind(item_type.unit().as_str())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("create_missing", e))?;
            }
        }

        let lock_names: Vec<String> = lock_order
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();

        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items \
             WHERE item_type = ANY($1) ORDER BY item_type FOR UPDATE"
        ))
        .bind(&lock_names)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_items", e))?;

        let items = rows.iter().map(item_from_row).collect::<Result<Vec<_>, _>>()?;
        debug!(kind = command.kind(), locked = items.len(), "unit locked");

        let snapshot = UnitSnapshot::new(items, reference_entries);
        let changes = command.decide(&snapshot)?;

        for item in &changes.items {
            upsert_item(&mut **tx, item).await?;
        }
        for entry in &changes.entries {
            insert_entry(&mut **tx, entry).await?;
        }

        Ok(changes.entries)
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn get(&self, item_type: ItemType) -> Result<Option<InventoryItem>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE item_type = $1"
        ))
        .bind(item_type.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn upsert(&self, item: InventoryItem) -> Result<(), StoreError> {
        item.ensure_non_negative()
            .map_err(|e| StoreError::Constraint(e.to_string()))?;
        upsert_item(&*self.pool, &item).await
    }

    async fn update_details(
        &self,
        item_type: ItemType,
        details: ItemDetails,
        at: DateTime<Utc>,
    ) -> Result<InventoryItem, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO inventory_items (
                item_type, quantity, unit, low_stock_threshold,
                expiration_date, lot_number, notes, updated_at
            )
            VALUES ($1, 0, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (item_type) DO UPDATE SET
                low_stock_threshold = EXCLUDED.low_stock_threshold,
                expiration_date = EXCLUDED.expiration_date,
                lot_number = EXCLUDED.lot_number,
                notes = EXCLUDED.notes,
                updated_at = EXCLUDED.updated_at
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(item_type.as_str())
        .bind(item_type.unit().as_str())
        .bind(details.low_stock_threshold)
        .bind(details.expiration_date)
        .bind(details.lot_number.as_deref())
        .bind(details.notes.as_deref())
        .bind(at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_details", e))?;

        item_from_row(&row)
    }

    async fn list(&self) -> Result<Vec<InventoryItem>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items ORDER BY item_type"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_items", e))?;

        let mut items = rows.iter().map(item_from_row).collect::<Result<Vec<_>, _>>()?;
        items.sort_by_key(|i| i.item_type);
        Ok(items)
    }

    async fn delete(&self, item_type: ItemType) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM inventory_items WHERE item_type = $1")
            .bind(item_type.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn ledger(&self, query: &LedgerQuery) -> Result<Vec<LedgerEntry>, StoreError> {
        select_entries(&*self.pool, query).await
    }

    async fn execute(&self, command: &StockCommand) -> Result<Vec<LedgerEntry>, InventoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        match self.run_unit(&mut tx, command).await {
            Ok(entries) => {
                tx.commit()
                    .await
                    .map_err(|e| map_sqlx_error("commit_transaction", e))?;
                Ok(entries)
            }
            Err(err) => Err(after_rollback(err, tx.rollback().await)),
        }
    }
}

async fn upsert_item<'e, E>(executor: E, item: &InventoryItem) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO inventory_items (
            item_type,
            quantity,
            unit,
            low_stock_threshold,
            expiration_date,
            lot_number,
            notes,
            updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (item_type) DO UPDATE SET
            quantity = EXCLUDED.quantity,
            unit = EXCLUDED.unit,
            low_stock_threshold = EXCLUDED.low_stock_threshold,
            expiration_date = EXCLUDED.expiration_date,
            lot_number = EXCLUDED.lot_number,
            notes = EXCLUDED.notes,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(item.item_type.as_str())
    .bind(item.quantity)
    .bind(item.unit.as_str())
    .bind(item.low_stock_threshold)
    .bind(item.expiration_date)
    .bind(item.lot_number.as_deref())
    .bind(item.notes.as_deref())
    .bind(item.updated_at)
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("upsert_item", e))?;
    Ok(())
}

async fn insert_entry<'e, E>(executor: E, entry: &LedgerEntry) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(&format!(
        "INSERT INTO ledger_entries ({ENTRY_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
    ))
    .bind(entry.id.as_uuid())
    .bind(entry.item_type.as_str())
    .bind(entry.change_amount)
    .bind(entry.quantity_before)
    .bind(entry.quantity_after)
    .bind(entry.reason.as_str())
    .bind(entry.reference.as_ref().map(|r| r.reference_type.as_str()))
    .bind(entry.reference.as_ref().map(|r| r.reference_id))
    .bind(entry.performed_by.as_uuid())
    .bind(entry.recorded_at)
    .bind(entry.notes.as_deref())
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("insert_entry", e))?;
    Ok(())
}

/// Newest first in SQL so `LIMIT` keeps the most recent; reversed to ledger order.
async fn select_entries<'e, E>(executor: E, query: &LedgerQuery) -> Result<Vec<LedgerEntry>, StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query(&format!(
        "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
         WHERE ($1::TEXT IS NULL OR item_type = $1) \
           AND ($2::TEXT IS NULL OR (reference_type = $2 AND reference_id = $3)) \
         ORDER BY seq DESC \
         LIMIT $4"
    ))
    .bind(query.item_type.map(ItemType::as_str))
    .bind(query.reference.as_ref().map(|r| r.reference_type.as_str()))
    .bind(query.reference.as_ref().map(|r| r.reference_id))
    .bind(query.limit.map(|l| l as i64))
    .fetch_all(executor)
    .await
    .map_err(|e| map_sqlx_error("select_entries", e))?;

    let mut entries = rows.iter().map(entry_from_row).collect::<Result<Vec<_>, _>>()?;
    entries.reverse();
    Ok(entries)
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("failed to read {name}: {e}")))
}

fn parsed<T: FromStr>(raw: &str, what: &str) -> Result<T, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown {what}: {raw}")))
}

fn item_from_row(row: &PgRow) -> Result<InventoryItem, StoreError> {
    let item_type: String = column(row, "item_type")?;
    let unit: String = column(row, "unit")?;
    Ok(InventoryItem {
        item_type: parsed::<ItemType>(&item_type, "item type")?,
        quantity: column::<Decimal>(row, "quantity")?,
        unit: parsed::<Unit>(&unit, "unit")?,
        low_stock_threshold: column::<Option<Decimal>>(row, "low_stock_threshold")?,
        expiration_date: column::<Option<NaiveDate>>(row, "expiration_date")?,
        lot_number: column::<Option<String>>(row, "lot_number")?,
        notes: column::<Option<String>>(row, "notes")?,
        updated_at: column::<DateTime<Utc>>(row, "updated_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    let item_type: String = column(row, "item_type")?;
    let reason: String = column(row, "reason")?;
    let reference_type: Option<String> = column(row, "reference_type")?;
    let reference_id: Option<i64> = column(row, "reference_id")?;
    let reference = match (reference_type, reference_id) {
        (Some(t), Some(id)) => Some(Reference::new(t, id)),
        _ => None,
    };

    Ok(LedgerEntry {
        id: LedgerEntryId::from_uuid(column::<Uuid>(row, "id")?),
        item_type: parsed::<ItemType>(&item_type, "item type")?,
        change_amount: column::<Decimal>(row, "change_amount")?,
        quantity_before: column::<Decimal>(row, "quantity_before")?,
        quantity_after: column::<Decimal>(row, "quantity_after")?,
        reason: parsed::<AdjustmentReason>(&reason, "reason")?,
        reference,
        performed_by: UserId::from_uuid(column::<Uuid>(row, "performed_by")?),
        recorded_at: column::<DateTime<Utc>>(row, "recorded_at")?,
        notes: column::<Option<String>>(row, "notes")?,
    })
}

/// The unit's own error wins over a failed rollback; the server discards the
/// transaction when the connection drops either way.
fn after_rollback(err: InventoryError, rollback: Result<(), sqlx::Error>) -> InventoryError {
    if let Err(rollback_err) = rollback {
        warn!(
            error = %map_sqlx_error("rollback", rollback_err),
            original = %err,
            "rollback failed"
        );
    }
    err
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") | Some("55P03") | Some("23505") => {
                    StoreError::Conflict(msg)
                }
                Some("23514") => StoreError::Constraint(msg),
                _ => StoreError::Aborted(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("i/o error in {operation}: {e}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        _ => StoreError::Aborted(format!("sqlx error in {operation}: {err}")),
    }
}
