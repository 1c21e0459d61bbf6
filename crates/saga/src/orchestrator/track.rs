use chrono::{DateTime, Utc};
use common::SubscriptionId;
use domain::{ProductLink, SubscriptionMetadata, SubscriptionRecord, SwapWindowState};
use ledger::{LedgerKey, LedgerStore, LedgerTransaction, LedgerTransactionExt, Pool, TrackAssignment};

use super::{SubscriptionOrchestrator, out_of_stock};
use crate::commands::{TrackChangeOutcome, UpdateSubscriptionTrack};
use crate::dispatcher::EffectPlan;
use crate::error::{Result, SagaError, ValidationError};
use crate::services::{BillingEngine, JobQueue, Notifier, Storefront, SubscriptionUpdate};

impl<L, B, F, Q, N> SubscriptionOrchestrator<L, B, F, Q, N>
where
    L: LedgerStore,
    B: BillingEngine,
    F: Storefront,
    Q: JobQueue,
    N: Notifier,
{
    /// Moves the customer's primary subscription to a new track.
    ///
    /// With the window open this releases the previous track's swap unit
    /// (unless the subscriber already swapped) and reserves one on the new
    /// track. With the window closed only the metadata changes.
    #[tracing::instrument(skip(self), fields(customer = %cmd.customer_id))]
    pub async fn update_subscription_track(
        &self,
        cmd: UpdateSubscriptionTrack,
    ) -> Result<TrackChangeOutcome> {
        self.observe("update_subscription_track", self.run_track_change(cmd))
            .await
    }

    async fn run_track_change(&self, cmd: UpdateSubscriptionTrack) -> Result<TrackChangeOutcome> {
        let resolver = self.track_resolver().await?;
        let new_track = resolver.canonical(&cmd.new_track)?;

        let primary = self.primary_of(&cmd.customer_id).await?;
        let metadata = match &primary.metadata {
            Some(m) if m.track().is_some() => m.clone(),
            _ => return Err(ValidationError::MissingTrack(primary.id.clone()).into()),
        };

        let cycle = self.active_cycle().await?;
        let window = self.window(cycle.as_ref());
        let now = self.clock.now();

        let cycle = match cycle {
            Some(cycle) if window.is_open() => cycle,
            _ => {
                let mut metadata = metadata;
                metadata.product.track = Some(new_track);
                let updated = self
                    .billing_call(
                        self.billing
                            .update_subscription(&primary.id, SubscriptionUpdate::metadata(metadata)),
                    )
                    .await?;
                ensure_same_subscription(&primary.id, &updated.subscription)?;
                return Ok(TrackChangeOutcome {
                    subscription: updated.subscription,
                    swap_window: SwapWindowState::Closed,
                    ledger_mutations: 0,
                    dispatch: Default::default(),
                });
            }
        };

        let previous = if cmd.previous_track.trim().is_empty() {
            metadata.track().unwrap_or_default().to_string()
        } else {
            cmd.previous_track.clone()
        };
        let previous_track = resolver.canonical(&previous)?;
        let from = self.assignment(&cycle, &previous_track).await?;
        let to = self.assignment(&cycle, &new_track).await?;

        let mut tx = self.store(self.ledger.begin()).await?;
        let staged = self
            .track_change_in_tx(&mut tx, &primary, metadata, &from, &to, cmd.have_swapped, now)
            .await;
        let (subscription, ledger_mutations) = match staged {
            Ok(changed) => changed,
            Err(e) => {
                self.rollback(tx, &e).await;
                return Err(e);
            }
        };
        let receipt = self.store(tx.commit()).await?;

        let dispatch = self
            .dispatcher
            .dispatch(EffectPlan::new().seal(&receipt))
            .await;
        Ok(TrackChangeOutcome {
            subscription,
            swap_window: window,
            ledger_mutations,
            dispatch,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn track_change_in_tx(
        &self,
        tx: &mut L::Tx,
        primary: &SubscriptionRecord,
        metadata: SubscriptionMetadata,
        from: &TrackAssignment,
        to: &TrackAssignment,
        have_swapped: bool,
        now: DateTime<Utc>,
    ) -> Result<(SubscriptionRecord, usize)> {
        let from_key = LedgerKey::new(from.cycle_id.clone(), from.product_id.clone());
        let to_key = LedgerKey::new(to.cycle_id.clone(), to.product_id.clone());

        // Fail before any mutation when the target pool is empty.
        self.probe(tx, &to_key, Pool::Swap).await?;

        let mut mutations = 0;
        if !have_swapped {
            tracing::debug!(key = %from_key, "releasing previous track swap unit");
            self.store(tx.release_swap(&from_key)).await?;
            mutations += 1;
        }
        tracing::debug!(key = %to_key, "reserving new track swap unit");
        if !self.store(tx.reserve_swap(&to_key)).await?.is_reserved() {
            return Err(out_of_stock(&to_key, Pool::Swap));
        }
        mutations += 1;

        let metadata = SubscriptionMetadata {
            product: ProductLink {
                id: to.product_id.clone(),
                variant_id: to.variant_id.clone(),
                track: Some(to.track.clone()),
                swapped: true,
                swapped_at: Some(now),
            },
            ..metadata
        };
        let updated = self
            .billing_call(
                self.billing
                    .update_subscription(&primary.id, SubscriptionUpdate::metadata(metadata)),
            )
            .await?;
        ensure_same_subscription(&primary.id, &updated.subscription)?;
        Ok((updated.subscription, mutations))
    }
}

fn ensure_same_subscription(expected: &SubscriptionId, updated: &SubscriptionRecord) -> Result<()> {
    if updated.id == *expected {
        Ok(())
    } else {
        Err(SagaError::Integrity(format!(
            "billing engine updated {} instead of {expected}",
            updated.id
        )))
    }
}
