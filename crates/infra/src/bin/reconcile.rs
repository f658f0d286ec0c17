//! Operator check: replay the ledger against the item rows.
//!
//! Reads `DATABASE_URL` (and the other `STOCKLEDGER_*` settings) from the
//! environment or `.env`, applies the schema if missing, and exits with
//! status 1 when any item drifts from its ledger.

use std::process::ExitCode;

use anyhow::{Context, bail};
use tracing::{info, warn};

use stockledger_infra::{InventoryLedger, LedgerConfig, PostgresInventoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = LedgerConfig::from_env().context("loading configuration")?;
    stockledger_observability::init_with(config.log_format);

    if config.database_url.is_none() {
        bail!("DATABASE_URL must be set to reconcile a ledger");
    }

    let store = PostgresInventoryStore::connect(&config)
        .await
        .context("connecting to postgres")?;
    store.migrate().await.context("applying schema")?;

    let ledger = InventoryLedger::from_config(store, &config);
    let reports = ledger.reconcile().await.context("reconciling ledger")?;

    let mut drifted = 0usize;
    for report in &reports {
        if report.is_consistent() {
            info!(
                item_type = %report.item_type,
                quantity = %report.replayed,
                entries = report.entry_count,
                "item reconciles"
            );
        } else {
            drifted += 1;
        }
    }

    if drifted > 0 {
        warn!(drifted, checked = reports.len(), "reconciliation found drift");
        return Ok(ExitCode::FAILURE);
    }

    info!(checked = reports.len(), "ledger consistent");
    Ok(ExitCode::SUCCESS)
}
