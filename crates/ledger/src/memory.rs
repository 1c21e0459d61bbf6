use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::CycleId;
use domain::{CycleStatus, RotationCycle, Track};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    CommitReceipt, LedgerDelta, LedgerError, LedgerKey, LedgerOp, Pool, ProductLedgerRow, Result,
    TrackAssignment,
    store::{LedgerStore, LedgerTransaction},
};

type Rows = HashMap<LedgerKey, ProductLedgerRow>;

#[derive(Default)]
struct Catalog {
    cycles: Vec<RotationCycle>,
    assignments: Vec<TrackAssignment>,
    tracks: Vec<Track>,
}

/// In-memory ledger for tests and local runs.
///
/// Transactions hold an exclusive lock over all rows for their lifetime,
/// which is a stricter version of the row locks the PostgreSQL store takes.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    rows: Arc<Mutex<Rows>>,
    catalog: Arc<RwLock<Catalog>>,
    fail_on_begin: Arc<AtomicBool>,
    fail_on_commit: Arc<AtomicBool>,
    committed_mutations: Arc<AtomicU64>,
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a cycle. Activating a cycle archives any other active one.
    pub async fn put_cycle(&self, cycle: RotationCycle) {
        let mut catalog = self.catalog.write().await;
        if cycle.status == CycleStatus::Active {
            for c in catalog.cycles.iter_mut().filter(|c| c.status == CycleStatus::Active) {
                c.status = CycleStatus::Archived;
            }
        }
        catalog.cycles.retain(|c| c.id != cycle.id);
        catalog.cycles.push(cycle);
    }

    pub async fn put_track(&self, track: Track) {
        let mut catalog = self.catalog.write().await;
        catalog.tracks.retain(|t| t.id != track.id);
        catalog.tracks.push(track);
    }

    pub async fn assign_track(&self, assignment: TrackAssignment) {
        let mut catalog = self.catalog.write().await;
        catalog
            .assignments
            .retain(|a| !(a.cycle_id == assignment.cycle_id && a.track == assignment.track));
        catalog.assignments.push(assignment);
    }

    /// Provisions a row, replacing any existing counters.
    pub async fn put_row(&self, row: ProductLedgerRow) {
        self.rows.lock().await.insert(row.key.clone(), row);
    }

    /// Flags a row inactive. Rows are never removed.
    pub async fn retire_row(&self, key: &LedgerKey) {
        if let Some(row) = self.rows.lock().await.get_mut(key) {
            row.active = false;
        }
    }

    /// Configures `begin` to fail.
    pub fn set_fail_on_begin(&self, fail: bool) {
        self.fail_on_begin.store(fail, Ordering::SeqCst);
    }

    /// Configures `commit` to fail, discarding the transaction's mutations.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Total number of ledger ops made durable by committed transactions.
    pub fn committed_mutations(&self) -> u64 {
        self.committed_mutations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = InMemoryLedgerTransaction;

    async fn active_cycle(&self) -> Result<Option<RotationCycle>> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .cycles
            .iter()
            .find(|c| c.status == CycleStatus::Active)
            .cloned())
    }

    async fn track_assignment(
        &self,
        cycle_id: &CycleId,
        track: &str,
    ) -> Result<Option<TrackAssignment>> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .assignments
            .iter()
            .find(|a| &a.cycle_id == cycle_id && a.track == track)
            .cloned())
    }

    async fn tracks(&self) -> Result<Vec<Track>> {
        Ok(self.catalog.read().await.tracks.clone())
    }

    async fn get_row(&self, key: &LedgerKey) -> Result<Option<ProductLedgerRow>> {
        Ok(self.rows.lock().await.get(key).cloned())
    }

    async fn begin(&self) -> Result<Self::Tx> {
        if self.fail_on_begin.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("begin refused".to_string()));
        }
        let rows = self.rows.clone().lock_owned().await;
        Ok(InMemoryLedgerTransaction {
            rows,
            staged: HashMap::new(),
            deltas: Vec::new(),
            ops: 0,
            fail_on_commit: self.fail_on_commit.load(Ordering::SeqCst),
            committed_mutations: self.committed_mutations.clone(),
        })
    }
}

/// Transaction over [`InMemoryLedgerStore`]. Mutations are staged and only
/// written back on commit.
pub struct InMemoryLedgerTransaction {
    rows: OwnedMutexGuard<Rows>,
    staged: Rows,
    deltas: Vec<LedgerDelta>,
    ops: u64,
    fail_on_commit: bool,
    committed_mutations: Arc<AtomicU64>,
}

impl InMemoryLedgerTransaction {
    fn current(&self, key: &LedgerKey) -> Option<&ProductLedgerRow> {
        self.staged.get(key).or_else(|| self.rows.get(key))
    }
}

fn counter_mut(row: &mut ProductLedgerRow, pool: Pool) -> &mut i64 {
    match pool {
        Pool::ExistingSubscriber => &mut row.existing_sub_qty,
        Pool::NewSubscriber => &mut row.new_sub_qty,
        Pool::Swap => &mut row.swap_qty,
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryLedgerTransaction {
    async fn row(&mut self, key: &LedgerKey) -> Result<Option<ProductLedgerRow>> {
        Ok(self.current(key).filter(|r| r.active).cloned())
    }

    async fn execute(&mut self, op: LedgerOp, key: &LedgerKey) -> Result<u64> {
        metrics::counter!("ledger_mutations_total", "op" => op.as_str()).increment(1);
        let Some(mut row) = self.current(key).filter(|r| r.active).cloned() else {
            return Ok(0);
        };
        if let Some(pool) = op.guard()
            && row.quantity(pool) <= 0
        {
            return Ok(0);
        }

        for &(pool, delta) in op.deltas() {
            *counter_mut(&mut row, pool) += delta;
        }
        row.updated_at = Utc::now();

        tracing::debug!(%key, op = op.as_str(), "ledger mutation staged");
        self.deltas.extend(LedgerDelta::from_applied(op, &row));
        self.staged.insert(key.clone(), row);
        self.ops += 1;
        Ok(1)
    }

    async fn commit(mut self) -> Result<CommitReceipt> {
        if self.fail_on_commit {
            return Err(LedgerError::Unavailable("commit refused".to_string()));
        }
        let staged = std::mem::take(&mut self.staged);
        self.rows.extend(staged);
        self.committed_mutations.fetch_add(self.ops, Ordering::SeqCst);
        Ok(CommitReceipt::new(std::mem::take(&mut self.deltas)))
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
