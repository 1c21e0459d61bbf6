//! Inventory ledger for rotation cycles.
//!
//! Each `(cycle, product)` row holds three pools: units reserved for existing
//! subscribers, units available to new subscribers, and units available for
//! swaps. Every mutation is a single conditional statement executed inside a
//! [`LedgerTransaction`]; the affected-row count is the only availability signal.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod row;
pub mod store;

pub use error::{LedgerError, Result};
pub use memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use row::{CommitReceipt, LedgerDelta, LedgerKey, LedgerOp, Pool, ProductLedgerRow, TrackAssignment};
pub use store::{LedgerStore, LedgerTransaction, LedgerTransactionExt, Reservation};
