use chrono::{DateTime, Utc};
use common::VariantId;
use domain::{
    ProductLink, RotationCycle, SubscriptionMetadata, SubscriptionRecord, SwapWindowSnapshot,
};
use ledger::{CommitReceipt, LedgerKey, LedgerStore, LedgerTransaction, LedgerTransactionExt, Pool};
use serde_json::json;

use super::{SubscriptionOrchestrator, out_of_stock};
use crate::commands::{SwapOutcome, SwapSubscriptionRecord};
use crate::dispatcher::EffectPlan;
use crate::error::{Result, SagaError, ValidationError};
use crate::jobs::JobKind;
use crate::services::{BillingEngine, JobQueue, Notifier, Storefront, SubscriptionUpdate};

impl<L, B, F, Q, N> SubscriptionOrchestrator<L, B, F, Q, N>
where
    L: LedgerStore,
    B: BillingEngine,
    F: Storefront,
    Q: JobQueue,
    N: Notifier,
{
    /// Exchanges the product held by a subscription.
    ///
    /// Stock swaps move one unit of the held product into swap stock and take
    /// one unit of swap stock for the new product. That ledger transaction
    /// commits before the billing engine records the new product, so a failed
    /// metadata update leaves inventory adjusted and the subscription stale.
    /// Stock swaps require an open swap window. Credit swaps never touch the
    /// ledger and are allowed at any time.
    #[tracing::instrument(skip(self), fields(subscription = %cmd.subscription_id, to = %cmd.to_product))]
    pub async fn swap_subscription_record(&self, cmd: SwapSubscriptionRecord) -> Result<SwapOutcome> {
        self.observe("swap_subscription_record", self.run_swap(cmd))
            .await
    }

    async fn run_swap(&self, cmd: SwapSubscriptionRecord) -> Result<SwapOutcome> {
        let track = self.track_resolver().await?.canonical(&cmd.track)?;
        let record = self
            .billing_call(self.billing.get_subscription(&cmd.subscription_id))
            .await?
            .ok_or_else(|| SagaError::not_found("subscription", &cmd.subscription_id))?;

        let credit_swap =
            cmd.is_credit_swap || self.config.is_credit_swap_product(&cmd.to_product);
        let cycle = self.active_cycle().await?;

        let (receipt, to_variant) = if credit_swap {
            let variant = self.check_credit_variant(&cmd, cycle.as_ref()).await?;
            (None, Some(variant))
        } else {
            let cycle = cycle
                .as_ref()
                .ok_or_else(|| SagaError::not_found("rotation cycle", "active"))?;
            if !self.window(Some(cycle)).is_open() {
                return Err(ValidationError::SwapWindowClosed(cycle.id.clone()).into());
            }
            let (receipt, variant) = self.swap_stock(cycle, &cmd).await?;
            (Some(receipt), variant)
        };

        let now = self.clock.now();
        let metadata = swapped_metadata(&record, &cmd, track.clone(), to_variant, cycle.as_ref(), now);
        let update = self
            .billing_call(
                self.billing
                    .update_subscription(&record.id, SubscriptionUpdate::metadata(metadata)),
            )
            .await;

        let updated = match update {
            Ok(updated) => updated,
            Err(e) => {
                if let Some(receipt) = &receipt {
                    tracing::error!(
                        subscription = %record.id,
                        error = %e,
                        "swap committed to the ledger but the metadata update failed"
                    );
                    self.dispatcher
                        .dispatch(EffectPlan::new().seal(receipt))
                        .await;
                }
                return Err(e);
            }
        };

        let mut effects = EffectPlan::new();
        effects.job(
            JobKind::AnalyticsSync,
            json!({
                "subscriptionId": updated.subscription.id,
                "customerId": updated.subscription.customer_id,
                "track": track,
                "fromProduct": cmd.from_product,
                "toProduct": cmd.to_product,
                "creditSwap": credit_swap,
            }),
        );
        if let Some(email) = updated.customer.as_ref().and_then(|c| c.email.as_deref()) {
            effects.job(
                JobKind::SwapConfirmation,
                json!({
                    "email": email,
                    "subscriptionId": updated.subscription.id,
                    "productId": cmd.to_product,
                }),
            );
        }
        let committed = match &receipt {
            Some(receipt) => effects.seal(receipt),
            None => effects.without_ledger(),
        };
        let dispatch = self.dispatcher.dispatch(committed).await;

        Ok(SwapOutcome {
            subscription: updated.subscription,
            credit_swap,
            dispatch,
        })
    }

    /// Credit swaps only require the storefront variant to be in stock.
    async fn check_credit_variant(
        &self,
        cmd: &SwapSubscriptionRecord,
        cycle: Option<&RotationCycle>,
    ) -> Result<VariantId> {
        let variant = match &cmd.to_variant {
            Some(variant) => variant.clone(),
            None => self
                .storefront_call(self.storefront.fetch_variants(&cmd.to_product))
                .await?
                .into_iter()
                .next()
                .map(|v| v.id)
                .ok_or_else(|| SagaError::not_found("variant", &cmd.to_product))?,
        };
        if self
            .storefront_call(self.storefront.is_variant_available(&variant))
            .await?
        {
            Ok(variant)
        } else {
            Err(SagaError::OutOfStock {
                cycle: cycle.map(|c| c.id.clone()),
                product: cmd.to_product.clone(),
                pool: Pool::Swap,
            })
        }
    }

    /// Moves the held unit into swap stock and takes one for the target, as
    /// one committed transaction.
    async fn swap_stock(
        &self,
        cycle: &RotationCycle,
        cmd: &SwapSubscriptionRecord,
    ) -> Result<(CommitReceipt, Option<VariantId>)> {
        let from_key = LedgerKey::new(cycle.id.clone(), cmd.from_product.clone());
        let to_key = LedgerKey::new(cycle.id.clone(), cmd.to_product.clone());

        let mut tx = self.store(self.ledger.begin()).await?;
        let staged: Result<Option<VariantId>> = async {
            let target = self
                .store(tx.row(&to_key))
                .await?
                .ok_or_else(|| SagaError::not_found("ledger row", &to_key))?;
            if target.swap_qty <= 0 {
                return Err(out_of_stock(&to_key, Pool::Swap));
            }
            self.store(tx.convert_to_swap(&from_key)).await?;
            if !self.store(tx.reserve_swap(&to_key)).await?.is_reserved() {
                return Err(out_of_stock(&to_key, Pool::Swap));
            }
            Ok(cmd.to_variant.clone().or(target.variant_id))
        }
        .await;

        match staged {
            Ok(variant) => {
                let receipt = self.store(tx.commit()).await?;
                Ok((receipt, variant))
            }
            Err(e) => {
                self.rollback(tx, &e).await;
                Err(e)
            }
        }
    }
}

fn swapped_metadata(
    record: &SubscriptionRecord,
    cmd: &SwapSubscriptionRecord,
    track: String,
    variant_id: Option<VariantId>,
    cycle: Option<&RotationCycle>,
    now: DateTime<Utc>,
) -> SubscriptionMetadata {
    let product = ProductLink {
        id: cmd.to_product.clone(),
        variant_id,
        track: Some(track),
        swapped: true,
        swapped_at: Some(now),
    };
    let swap_window_snapshot = cycle.map(|c| SwapWindowSnapshot::capture(c, now));
    match &record.metadata {
        Some(existing) => SubscriptionMetadata {
            product,
            swap_window_snapshot: swap_window_snapshot.or_else(|| existing.swap_window_snapshot.clone()),
            ..existing.clone()
        },
        None => SubscriptionMetadata {
            subscription_type: record.subscription_type,
            product,
            swap_window_snapshot,
            gift: None,
        },
    }
}
