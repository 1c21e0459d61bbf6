use async_trait::async_trait;
use common::CycleId;
use domain::{RotationCycle, Track};

use crate::error::{LedgerError, Result};
use crate::row::{CommitReceipt, LedgerKey, LedgerOp, ProductLedgerRow, TrackAssignment};

/// Outcome of a guarded reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Reserved,
    /// The guarded update matched no row. The counter is unchanged.
    OutOfStock,
}

impl Reservation {
    pub fn is_reserved(&self) -> bool {
        matches!(self, Reservation::Reserved)
    }
}

/// Read access to cycle configuration plus a transaction factory.
///
/// Cycles, track assignments and ledger rows are provisioned by cycle setup
/// outside this crate; the store only reads them and mutates counters.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTransaction;

    /// Returns the single active rotation cycle, if any.
    async fn active_cycle(&self) -> Result<Option<RotationCycle>>;

    /// Returns the cycle's default product for a canonical track value.
    async fn track_assignment(
        &self,
        cycle_id: &CycleId,
        track: &str,
    ) -> Result<Option<TrackAssignment>>;

    /// Returns every catalog track, active or not.
    async fn tracks(&self) -> Result<Vec<Track>>;

    /// Reads a row outside any transaction.
    async fn get_row(&self, key: &LedgerKey) -> Result<Option<ProductLedgerRow>>;

    /// Opens a transaction. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// A unit of ledger work.
///
/// `execute` is the conditional-update primitive: one statement, guard and
/// mutation together, returning the affected-row count. No implementation may
/// read a counter and then write it in a separate step.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Reads a row inside the transaction. Used for existence checks and
    /// availability probes, never as a basis for a mutation.
    async fn row(&mut self, key: &LedgerKey) -> Result<Option<ProductLedgerRow>>;

    /// Applies `op` to the active row at `key`. Returns 0 or 1.
    async fn execute(&mut self, op: LedgerOp, key: &LedgerKey) -> Result<u64>;

    /// Makes every applied mutation durable.
    async fn commit(self) -> Result<CommitReceipt>;

    /// Discards every applied mutation.
    async fn rollback(self) -> Result<()>;
}

/// Typed wrappers over [`LedgerTransaction::execute`] that enforce the
/// affected-row contract for each op.
#[async_trait]
pub trait LedgerTransactionExt: LedgerTransaction {
    /// swap −1 when swap > 0.
    async fn reserve_swap(&mut self, key: &LedgerKey) -> Result<Reservation> {
        self.reserve(LedgerOp::ReserveSwap, key).await
    }

    /// new −1 when new > 0.
    async fn reserve_new_sub(&mut self, key: &LedgerKey) -> Result<Reservation> {
        self.reserve(LedgerOp::ReserveNewSub, key).await
    }

    /// swap +1. Restocking is never blocked.
    async fn release_swap(&mut self, key: &LedgerKey) -> Result<()> {
        self.apply_exact(LedgerOp::ReleaseSwap, key).await
    }

    /// existing −1, new +1.
    async fn bridge_back(&mut self, key: &LedgerKey) -> Result<()> {
        self.apply_exact(LedgerOp::BridgeBack, key).await
    }

    /// existing −1, swap +1.
    async fn convert_to_swap(&mut self, key: &LedgerKey) -> Result<()> {
        self.apply_exact(LedgerOp::ConvertToSwap, key).await
    }

    /// Zero rows means out of stock; anything other than 0 or 1 is corrupt.
    async fn reserve(&mut self, op: LedgerOp, key: &LedgerKey) -> Result<Reservation> {
        match self.execute(op, key).await? {
            1 => Ok(Reservation::Reserved),
            0 => {
                metrics::counter!("ledger_out_of_stock_total", "op" => op.as_str()).increment(1);
                Ok(Reservation::OutOfStock)
            }
            actual => Err(unexpected(op, key, actual)),
        }
    }

    /// Exactly one row must change.
    async fn apply_exact(&mut self, op: LedgerOp, key: &LedgerKey) -> Result<()> {
        match self.execute(op, key).await? {
            1 => Ok(()),
            actual => Err(unexpected(op, key, actual)),
        }
    }
}

impl<T: LedgerTransaction> LedgerTransactionExt for T {}

fn unexpected(op: LedgerOp, key: &LedgerKey, actual: u64) -> LedgerError {
    LedgerError::UnexpectedRowCount {
        op,
        cycle: key.cycle_id.clone(),
        product: key.product_id.clone(),
        expected: 1,
        actual,
    }
}
