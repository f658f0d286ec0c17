//! Process-wide logging setup shared by the ledger binaries and tests.

pub mod tracing;

pub use tracing::{LogFormat, init, init_with};
