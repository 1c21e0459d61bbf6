//! Subscription lifecycle orchestrator.
//!
//! Every write operation is one saga in two phases:
//!
//! 1. Transactional core: validation, then ledger statements and billing
//!    engine calls inside one ledger transaction. Any failure rolls the ledger
//!    back and propagates unchanged. Billing engine calls are not compensated.
//! 2. Post-commit dispatch: staged effects are sealed with the commit receipt
//!    and handed to the [`SideEffectDispatcher`].
//!
//! The active cycle is read once per saga and passed down explicitly.

mod cancel;
mod create;
mod reactivate;
mod reads;
mod swap;
mod term;
mod track;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use common::{Clock, CustomerId};
use domain::{RotationCycle, SubscriptionRecord, SubscriptionType, SwapWindowState, TrackResolver};
use ledger::{LedgerError, LedgerKey, LedgerStore, LedgerTransaction, Pool, TrackAssignment};

use crate::config::SagaConfig;
use crate::deadline;
use crate::dispatcher::SideEffectDispatcher;
use crate::error::{Result, SagaError};
use crate::services::{BillingEngine, JobQueue, Notifier, Storefront};

/// Coordinates the ledger, the billing engine and post-commit side effects.
pub struct SubscriptionOrchestrator<L, B, F, Q, N>
where
    L: LedgerStore,
    B: BillingEngine,
    F: Storefront,
    Q: JobQueue,
    N: Notifier,
{
    ledger: L,
    billing: B,
    storefront: F,
    dispatcher: SideEffectDispatcher<Q, N, F>,
    clock: Arc<dyn Clock>,
    config: SagaConfig,
}

impl<L, B, F, Q, N> SubscriptionOrchestrator<L, B, F, Q, N>
where
    L: LedgerStore,
    B: BillingEngine,
    F: Storefront + Clone,
    Q: JobQueue,
    N: Notifier,
{
    pub fn new(
        ledger: L,
        billing: B,
        storefront: F,
        queue: Q,
        notifier: N,
        clock: Arc<dyn Clock>,
        config: SagaConfig,
    ) -> Self {
        let dispatcher =
            SideEffectDispatcher::new(queue, notifier, storefront.clone(), config.dispatch_timeout);
        Self {
            ledger,
            billing,
            storefront,
            dispatcher,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }
}

impl<L, B, F, Q, N> SubscriptionOrchestrator<L, B, F, Q, N>
where
    L: LedgerStore,
    B: BillingEngine,
    F: Storefront,
    Q: JobQueue,
    N: Notifier,
{
    /// Records saga metrics around `fut`.
    async fn observe<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        metrics::counter!("subscription_saga_total", "operation" => operation).increment(1);
        let started = Instant::now();
        let result = fut.await;
        metrics::histogram!("subscription_saga_duration_seconds", "operation" => operation)
            .record(started.elapsed().as_secs_f64());
        match &result {
            Ok(_) => tracing::info!(operation, "saga completed"),
            Err(e) => {
                metrics::counter!(
                    "subscription_saga_failed_total",
                    "operation" => operation,
                    "kind" => e.kind()
                )
                .increment(1);
                tracing::warn!(operation, error = %e, "saga failed");
            }
        }
        result
    }

    async fn store<T, E>(
        &self,
        fut: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T>
    where
        E: Into<SagaError>,
    {
        deadline::within("ledger", self.config.store_timeout, fut).await
    }

    async fn billing_call<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        deadline::within("billing", self.config.billing_timeout, fut).await
    }

    async fn storefront_call<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        deadline::within("storefront", self.config.store_timeout, fut).await
    }

    /// Rolls back after `cause`. A failed rollback is logged; the transaction
    /// is dropped either way, which discards it.
    async fn rollback(&self, tx: L::Tx, cause: &SagaError) {
        tracing::warn!(error = %cause, "rolling back ledger transaction");
        if let Err(e) = self.store(tx.rollback()).await {
            tracing::warn!(error = %e, "ledger rollback failed");
        }
    }

    async fn active_cycle(&self) -> Result<Option<RotationCycle>> {
        self.store(self.ledger.active_cycle()).await
    }

    async fn track_resolver(&self) -> Result<TrackResolver> {
        Ok(TrackResolver::new(self.store(self.ledger.tracks()).await?))
    }

    async fn assignment(&self, cycle: &RotationCycle, track: &str) -> Result<TrackAssignment> {
        self.store(self.ledger.track_assignment(&cycle.id, track))
            .await?
            .ok_or_else(|| SagaError::not_found("track assignment", format!("{}/{track}", cycle.id)))
    }

    fn window(&self, cycle: Option<&RotationCycle>) -> SwapWindowState {
        SwapWindowState::for_cycle(cycle, self.clock.now())
    }

    /// The customer's live primary subscription.
    async fn primary_of(&self, customer_id: &CustomerId) -> Result<SubscriptionRecord> {
        self.billing_call(self.billing.list_subscriptions(customer_id))
            .await?
            .into_iter()
            .find(|s| s.subscription_type == SubscriptionType::Primary && s.status.is_live())
            .ok_or_else(|| SagaError::not_found("primary subscription", customer_id))
    }

    /// Existence and availability probe. Never the basis of a mutation.
    async fn probe(&self, tx: &mut L::Tx, key: &LedgerKey, pool: Pool) -> Result<()> {
        let row = self
            .store(tx.row(key))
            .await?
            .ok_or_else(|| SagaError::from(LedgerError::RowNotFound {
                cycle: key.cycle_id.clone(),
                product: key.product_id.clone(),
            }))?;
        if row.quantity(pool) > 0 {
            Ok(())
        } else {
            Err(out_of_stock(key, pool))
        }
    }
}

fn out_of_stock(key: &LedgerKey, pool: Pool) -> SagaError {
    SagaError::OutOfStock {
        cycle: Some(key.cycle_id.clone()),
        product: key.product_id.clone(),
        pool,
    }
}
