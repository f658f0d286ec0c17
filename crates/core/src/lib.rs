//! Identifiers and error primitives shared by the stock ledger crates.
//!
//! This crate has no storage or runtime concerns.

pub mod error;
pub mod id;

pub use error::DomainError;
pub use id::{LedgerEntryId, UserId};
