//! Stock commands as a single dispatchable type.

use serde::{Deserialize, Serialize};

use crate::adjustment::AdjustStock;
use crate::consumption::ConsumeForEvent;
use crate::error::InventoryResult;
use crate::reversal::ReverseEvent;
use crate::unit::{Changeset, UnitScope, UnitSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    Adjust(AdjustStock),
    Consume(ConsumeForEvent),
    Reverse(ReverseEvent),
}

impl StockCommand {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StockCommand::Adjust(_) => "adjust",
            StockCommand::Consume(_) => "consume",
            StockCommand::Reverse(_) => "reverse",
        }
    }

    pub fn scope(&self) -> UnitScope {
        match self {
            StockCommand::Adjust(cmd) => cmd.scope(),
            StockCommand::Consume(cmd) => cmd.scope(),
            StockCommand::Reverse(cmd) => cmd.scope(),
        }
    }

    /// Pure decision: the writes this command makes against `snapshot`.
    pub fn decide(&self, snapshot: &UnitSnapshot) -> InventoryResult<Changeset> {
        match self {
            StockCommand::Adjust(cmd) => cmd.decide(snapshot),
            StockCommand::Consume(cmd) => cmd.decide(snapshot),
            StockCommand::Reverse(cmd) => cmd.decide(snapshot),
        }
    }
}

impl From<AdjustStock> for StockCommand {
    fn from(value: AdjustStock) -> Self {
        StockCommand::Adjust(value)
    }
}

impl From<ConsumeForEvent> for StockCommand {
    fn from(value: ConsumeForEvent) -> Self {
        StockCommand::Consume(value)
    }
}

impl From<ReverseEvent> for StockCommand {
    fn from(value: ReverseEvent) -> Self {
        StockCommand::Reverse(value)
    }
}
