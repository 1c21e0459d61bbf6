use async_trait::async_trait;
use common::{CycleId, ProductId, VariantId};
use domain::{CycleStatus, RotationCycle, Track};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    CommitReceipt, LedgerDelta, LedgerError, LedgerKey, LedgerOp, ProductLedgerRow, Result,
    TrackAssignment,
    store::{LedgerStore, LedgerTransaction},
};

const RESERVE_SWAP: &str = r#"
    UPDATE product_ledger
    SET swap_qty = swap_qty - 1, updated_at = NOW()
    WHERE cycle_id = $1 AND product_id = $2 AND active AND swap_qty > 0
    RETURNING cycle_id, product_id, variant_id, swap_variant_ref,
              existing_sub_qty, new_sub_qty, swap_qty, active, updated_at
"#;

const RELEASE_SWAP: &str = r#"
    UPDATE product_ledger
    SET swap_qty = swap_qty + 1, updated_at = NOW()
    WHERE cycle_id = $1 AND product_id = $2 AND active
    RETURNING cycle_id, product_id, variant_id, swap_variant_ref,
              existing_sub_qty, new_sub_qty, swap_qty, active, updated_at
"#;

const RESERVE_NEW_SUB: &str = r#"
    UPDATE product_ledger
    SET new_sub_qty = new_sub_qty - 1, updated_at = NOW()
    WHERE cycle_id = $1 AND product_id = $2 AND active AND new_sub_qty > 0
    RETURNING cycle_id, product_id, variant_id, swap_variant_ref,
              existing_sub_qty, new_sub_qty, swap_qty, active, updated_at
"#;

const BRIDGE_BACK: &str = r#"
    UPDATE product_ledger
    SET existing_sub_qty = existing_sub_qty - 1,
        new_sub_qty = new_sub_qty + 1,
        updated_at = NOW()
    WHERE cycle_id = $1 AND product_id = $2 AND active AND existing_sub_qty > 0
    RETURNING cycle_id, product_id, variant_id, swap_variant_ref,
              existing_sub_qty, new_sub_qty, swap_qty, active, updated_at
"#;

const CONVERT_TO_SWAP: &str = r#"
    UPDATE product_ledger
    SET existing_sub_qty = existing_sub_qty - 1,
        swap_qty = swap_qty + 1,
        updated_at = NOW()
    WHERE cycle_id = $1 AND product_id = $2 AND active AND existing_sub_qty > 0
    RETURNING cycle_id, product_id, variant_id, swap_variant_ref,
              existing_sub_qty, new_sub_qty, swap_qty, active, updated_at
"#;

const SELECT_ROW: &str = r#"
    SELECT cycle_id, product_id, variant_id, swap_variant_ref,
           existing_sub_qty, new_sub_qty, swap_qty, active, updated_at
    FROM product_ledger
    WHERE cycle_id = $1 AND product_id = $2
"#;

fn statement(op: LedgerOp) -> &'static str {
    match op {
        LedgerOp::ReserveSwap => RESERVE_SWAP,
        LedgerOp::ReleaseSwap => RELEASE_SWAP,
        LedgerOp::ReserveNewSub => RESERVE_NEW_SUB,
        LedgerOp::BridgeBack => BRIDGE_BACK,
        LedgerOp::ConvertToSwap => CONVERT_TO_SWAP,
    }
}

/// PostgreSQL-backed ledger.
///
/// Each mutation is a single `UPDATE ... WHERE <guard> RETURNING` statement,
/// so concurrent transactions on the same row serialize on its row lock and
/// re-evaluate the guard after the lock is granted.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Inserts or updates a cycle. Used by cycle setup and tests.
    pub async fn upsert_cycle(&self, cycle: &RotationCycle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rotation_cycles (id, status, starts_at, ends_at, swap_opens_at, swap_closes_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                starts_at = EXCLUDED.starts_at,
                ends_at = EXCLUDED.ends_at,
                swap_opens_at = EXCLUDED.swap_opens_at,
                swap_closes_at = EXCLUDED.swap_closes_at
            "#,
        )
        .bind(cycle.id.as_str())
        .bind(cycle.status.as_str())
        .bind(cycle.starts_at)
        .bind(cycle.ends_at)
        .bind(cycle.swap_opens_at)
        .bind(cycle.swap_closes_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_track(&self, track: &Track) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tracks (id, value, active, aliases)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                value = EXCLUDED.value,
                active = EXCLUDED.active,
                aliases = EXCLUDED.aliases
            "#,
        )
        .bind(&track.id)
        .bind(&track.value)
        .bind(track.active)
        .bind(&track.aliases)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn assign_track(&self, assignment: &TrackAssignment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO track_assignments (cycle_id, track, product_id, variant_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (cycle_id, track) DO UPDATE SET
                product_id = EXCLUDED.product_id,
                variant_id = EXCLUDED.variant_id
            "#,
        )
        .bind(assignment.cycle_id.as_str())
        .bind(&assignment.track)
        .bind(assignment.product_id.as_str())
        .bind(assignment.variant_id.as_ref().map(VariantId::as_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Provisions a ledger row with the given counters.
    pub async fn upsert_row(&self, row: &ProductLedgerRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO product_ledger
                (cycle_id, product_id, variant_id, swap_variant_ref,
                 existing_sub_qty, new_sub_qty, swap_qty, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (cycle_id, product_id) DO UPDATE SET
                variant_id = EXCLUDED.variant_id,
                swap_variant_ref = EXCLUDED.swap_variant_ref,
                existing_sub_qty = EXCLUDED.existing_sub_qty,
                new_sub_qty = EXCLUDED.new_sub_qty,
                swap_qty = EXCLUDED.swap_qty,
                active = EXCLUDED.active,
                updated_at = NOW()
            "#,
        )
        .bind(row.key.cycle_id.as_str())
        .bind(row.key.product_id.as_str())
        .bind(row.variant_id.as_ref().map(VariantId::as_str))
        .bind(row.swap_variant_ref.as_ref().map(VariantId::as_str))
        .bind(row.existing_sub_qty)
        .bind(row.new_sub_qty)
        .bind(row.swap_qty)
        .bind(row.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_ledger(row: PgRow) -> Result<ProductLedgerRow> {
        let variant: Option<String> = row.try_get("variant_id")?;
        let swap_variant: Option<String> = row.try_get("swap_variant_ref")?;
        Ok(ProductLedgerRow {
            key: LedgerKey {
                cycle_id: CycleId::new(row.try_get::<String, _>("cycle_id")?),
                product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            },
            variant_id: variant.map(VariantId::new),
            swap_variant_ref: swap_variant.map(VariantId::new),
            existing_sub_qty: row.try_get("existing_sub_qty")?,
            new_sub_qty: row.try_get("new_sub_qty")?,
            swap_qty: row.try_get("swap_qty")?,
            active: row.try_get("active")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_cycle(row: PgRow) -> Result<RotationCycle> {
        let status: String = row.try_get("status")?;
        Ok(RotationCycle {
            id: CycleId::new(row.try_get::<String, _>("id")?),
            status: CycleStatus::parse(&status)
                .ok_or_else(|| LedgerError::Corrupt(format!("unknown cycle status {status}")))?,
            starts_at: row.try_get("starts_at")?,
            ends_at: row.try_get("ends_at")?,
            swap_opens_at: row.try_get("swap_opens_at")?,
            swap_closes_at: row.try_get("swap_closes_at")?,
        })
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    type Tx = PostgresLedgerTransaction;

    async fn active_cycle(&self) -> Result<Option<RotationCycle>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, starts_at, ends_at, swap_opens_at, swap_closes_at
            FROM rotation_cycles
            WHERE status = 'active'
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_cycle).transpose()
    }

    async fn track_assignment(
        &self,
        cycle_id: &CycleId,
        track: &str,
    ) -> Result<Option<TrackAssignment>> {
        let row = sqlx::query(
            r#"
            SELECT cycle_id, track, product_id, variant_id
            FROM track_assignments
            WHERE cycle_id = $1 AND track = $2
            "#,
        )
        .bind(cycle_id.as_str())
        .bind(track)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let variant: Option<String> = row.try_get("variant_id")?;
                Ok(Some(TrackAssignment {
                    cycle_id: CycleId::new(row.try_get::<String, _>("cycle_id")?),
                    track: row.try_get("track")?,
                    product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
                    variant_id: variant.map(VariantId::new),
                }))
            }
            None => Ok(None),
        }
    }

    async fn tracks(&self) -> Result<Vec<Track>> {
        let rows = sqlx::query("SELECT id, value, active, aliases FROM tracks ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Track {
                    id: row.try_get("id")?,
                    value: row.try_get("value")?,
                    active: row.try_get("active")?,
                    aliases: row.try_get("aliases")?,
                })
            })
            .collect()
    }

    async fn get_row(&self, key: &LedgerKey) -> Result<Option<ProductLedgerRow>> {
        let row = sqlx::query(SELECT_ROW)
            .bind(key.cycle_id.as_str())
            .bind(key.product_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_ledger).transpose()
    }

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(PostgresLedgerTransaction {
            tx: self.pool.begin().await?,
            deltas: Vec::new(),
        })
    }
}

/// An open PostgreSQL transaction on the ledger.
pub struct PostgresLedgerTransaction {
    tx: Transaction<'static, Postgres>,
    deltas: Vec<LedgerDelta>,
}

#[async_trait]
impl LedgerTransaction for PostgresLedgerTransaction {
    async fn row(&mut self, key: &LedgerKey) -> Result<Option<ProductLedgerRow>> {
        let row = sqlx::query(SELECT_ROW)
            .bind(key.cycle_id.as_str())
            .bind(key.product_id.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row
            .map(PostgresLedgerStore::row_to_ledger)
            .transpose()?
            .filter(|r| r.active))
    }

    async fn execute(&mut self, op: LedgerOp, key: &LedgerKey) -> Result<u64> {
        let updated = sqlx::query(statement(op))
            .bind(key.cycle_id.as_str())
            .bind(key.product_id.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;

        metrics::counter!("ledger_mutations_total", "op" => op.as_str()).increment(1);
        match updated {
            Some(row) => {
                let row = PostgresLedgerStore::row_to_ledger(row)?;
                tracing::debug!(%key, op = op.as_str(), "ledger row updated");
                self.deltas.extend(LedgerDelta::from_applied(op, &row));
                Ok(1)
            }
            None => {
                tracing::debug!(%key, op = op.as_str(), "ledger guard matched no row");
                Ok(0)
            }
        }
    }

    async fn commit(self) -> Result<CommitReceipt> {
        self.tx.commit().await?;
        Ok(CommitReceipt::new(self.deltas))
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
