use common::{CycleId, ProductId};
use thiserror::Error;

use crate::row::LedgerOp;

/// Errors that can occur when interacting with the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A mutation touched a different number of rows than the contract allows.
    /// The enclosing transaction must be rolled back.
    #[error(
        "{op} on {cycle}/{product} affected {actual} rows, expected {expected}"
    )]
    UnexpectedRowCount {
        op: LedgerOp,
        cycle: CycleId,
        product: ProductId,
        expected: u64,
        actual: u64,
    },

    /// No active ledger row exists for the key.
    #[error("No ledger row for {cycle}/{product}")]
    RowNotFound { cycle: CycleId, product: ProductId },

    /// A stored value could not be mapped to a domain type.
    #[error("Corrupt ledger data: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The store refused the operation (used by the in-memory store's failure injection).
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
