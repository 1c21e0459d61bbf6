use chrono::{DateTime, Utc};
use common::{CycleId, ProductId, VariantId};
use serde::{Deserialize, Serialize};

/// Primary key of a ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub cycle_id: CycleId,
    pub product_id: ProductId,
}

impl LedgerKey {
    pub fn new(cycle_id: impl Into<CycleId>, product_id: impl Into<ProductId>) -> Self {
        Self {
            cycle_id: cycle_id.into(),
            product_id: product_id.into(),
        }
    }
}

impl std::fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.cycle_id, self.product_id)
    }
}

/// Inventory counters for one product in one rotation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLedgerRow {
    pub key: LedgerKey,
    /// Subscriber-facing variant for this product.
    pub variant_id: Option<VariantId>,
    /// Storefront variant that tracks swap stock.
    pub swap_variant_ref: Option<VariantId>,
    pub existing_sub_qty: i64,
    pub new_sub_qty: i64,
    pub swap_qty: i64,
    /// Rows are never deleted; retired rows are flagged inactive.
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl ProductLedgerRow {
    /// Returns a fresh active row with the given counters.
    pub fn new(key: LedgerKey, existing_sub_qty: i64, new_sub_qty: i64, swap_qty: i64) -> Self {
        Self {
            key,
            variant_id: None,
            swap_variant_ref: None,
            existing_sub_qty,
            new_sub_qty,
            swap_qty,
            active: true,
            updated_at: Utc::now(),
        }
    }

    pub fn with_variants(mut self, variant: Option<VariantId>, swap_variant: Option<VariantId>) -> Self {
        self.variant_id = variant;
        self.swap_variant_ref = swap_variant;
        self
    }

    pub fn quantity(&self, pool: Pool) -> i64 {
        match pool {
            Pool::ExistingSubscriber => self.existing_sub_qty,
            Pool::NewSubscriber => self.new_sub_qty,
            Pool::Swap => self.swap_qty,
        }
    }

    /// Storefront variant whose stock mirrors `pool`.
    pub fn variant_for(&self, pool: Pool) -> Option<&VariantId> {
        match pool {
            Pool::Swap => self.swap_variant_ref.as_ref().or(self.variant_id.as_ref()),
            _ => self.variant_id.as_ref(),
        }
    }
}

/// One of the three counters on a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pool {
    ExistingSubscriber,
    NewSubscriber,
    Swap,
}

impl Pool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pool::ExistingSubscriber => "existing_subscriber",
            Pool::NewSubscriber => "new_subscriber",
            Pool::Swap => "swap",
        }
    }
}

impl std::fmt::Display for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The five ledger mutations.
///
/// | op | effect | guard |
/// |---|---|---|
/// | `ReserveSwap` | swap −1 | swap > 0 |
/// | `ReleaseSwap` | swap +1 | none |
/// | `ReserveNewSub` | new −1 | new > 0 |
/// | `BridgeBack` | existing −1, new +1 | existing > 0 |
/// | `ConvertToSwap` | existing −1, swap +1 | existing > 0 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOp {
    ReserveSwap,
    ReleaseSwap,
    ReserveNewSub,
    BridgeBack,
    ConvertToSwap,
}

impl LedgerOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerOp::ReserveSwap => "reserve_swap",
            LedgerOp::ReleaseSwap => "release_swap",
            LedgerOp::ReserveNewSub => "reserve_new_sub",
            LedgerOp::BridgeBack => "bridge_back",
            LedgerOp::ConvertToSwap => "convert_to_swap",
        }
    }

    /// Counter changes applied by this op, always as a complete set.
    pub fn deltas(&self) -> &'static [(Pool, i64)] {
        match self {
            LedgerOp::ReserveSwap => &[(Pool::Swap, -1)],
            LedgerOp::ReleaseSwap => &[(Pool::Swap, 1)],
            LedgerOp::ReserveNewSub => &[(Pool::NewSubscriber, -1)],
            LedgerOp::BridgeBack => &[(Pool::ExistingSubscriber, -1), (Pool::NewSubscriber, 1)],
            LedgerOp::ConvertToSwap => &[(Pool::ExistingSubscriber, -1), (Pool::Swap, 1)],
        }
    }

    /// Pool that must be positive for the op to apply, if any.
    pub fn guard(&self) -> Option<Pool> {
        match self {
            LedgerOp::ReserveSwap => Some(Pool::Swap),
            LedgerOp::ReleaseSwap => None,
            LedgerOp::ReserveNewSub => Some(Pool::NewSubscriber),
            LedgerOp::BridgeBack | LedgerOp::ConvertToSwap => Some(Pool::ExistingSubscriber),
        }
    }

    /// Whether zero affected rows means the pool is exhausted, as opposed to
    /// an integrity failure.
    pub fn is_reservation(&self) -> bool {
        matches!(self, LedgerOp::ReserveSwap | LedgerOp::ReserveNewSub)
    }
}

impl std::fmt::Display for LedgerOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single applied counter change, mirrored to the storefront after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
    pub cycle_id: CycleId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub op: LedgerOp,
    pub pool: Pool,
    pub delta: i64,
}

impl LedgerDelta {
    /// Expands an applied op into its per-pool deltas.
    pub fn from_applied(op: LedgerOp, row: &ProductLedgerRow) -> Vec<LedgerDelta> {
        op.deltas()
            .iter()
            .map(|&(pool, delta)| LedgerDelta {
                cycle_id: row.key.cycle_id.clone(),
                product_id: row.key.product_id.clone(),
                variant_id: row.variant_for(pool).cloned(),
                op,
                pool,
                delta,
            })
            .collect()
    }
}

/// Proof that a ledger transaction committed, with every delta it applied.
///
/// Only ledger transactions can construct a receipt, so holding one means
/// local state is durable.
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    deltas: Vec<LedgerDelta>,
    committed_at: DateTime<Utc>,
}

impl CommitReceipt {
    pub(crate) fn new(deltas: Vec<LedgerDelta>) -> Self {
        Self {
            deltas,
            committed_at: Utc::now(),
        }
    }

    pub fn deltas(&self) -> &[LedgerDelta] {
        &self.deltas
    }

    pub fn committed_at(&self) -> DateTime<Utc> {
        self.committed_at
    }

    /// Returns true if the transaction applied no mutations.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// A cycle's default product for a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackAssignment {
    pub cycle_id: CycleId,
    pub track: String,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paired_ops_balance() {
        for op in [LedgerOp::BridgeBack, LedgerOp::ConvertToSwap] {
            let net: i64 = op.deltas().iter().map(|(_, d)| d).sum();
            assert_eq!(net, 0, "{op} must move a unit, not create or destroy one");
            assert_eq!(op.deltas().len(), 2);
        }
    }

    #[test]
    fn test_reservations_are_guarded() {
        assert!(LedgerOp::ReserveSwap.is_reservation());
        assert!(LedgerOp::ReserveNewSub.is_reservation());
        assert!(!LedgerOp::ReleaseSwap.is_reservation());
        assert_eq!(LedgerOp::ReleaseSwap.guard(), None);
        assert_eq!(LedgerOp::ReserveSwap.guard(), Some(Pool::Swap));
    }

    #[test]
    fn test_delta_uses_swap_variant_for_swap_pool() {
        let row = ProductLedgerRow::new(LedgerKey::new("c", "p"), 1, 1, 1).with_variants(
            Some(VariantId::new("v-main")),
            Some(VariantId::new("v-swap")),
        );
        let deltas = LedgerDelta::from_applied(LedgerOp::ConvertToSwap, &row);
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].pool, Pool::ExistingSubscriber);
        assert_eq!(deltas[0].variant_id.as_ref().unwrap().as_str(), "v-main");
        assert_eq!(deltas[1].pool, Pool::Swap);
        assert_eq!(deltas[1].variant_id.as_ref().unwrap().as_str(), "v-swap");
    }
}
