use common::CustomerId;
use domain::{RotationCycle, SubscriptionRecord, SubscriptionStatus, SubscriptionType};
use ledger::{CommitReceipt, LedgerKey, LedgerStore, LedgerTransaction, LedgerTransactionExt};
use serde_json::json;

use super::SubscriptionOrchestrator;
use crate::commands::{CancelAllSubscriptions, CancelOutcome, CancelSubscription};
use crate::dispatcher::EffectPlan;
use crate::error::{Result, SagaError, ValidationError};
use crate::jobs::JobKind;
use crate::services::{BillingEngine, JobQueue, Notifier, Storefront};

const CANCELLED_EVENT: &str = "subscription.cancelled";

impl<L, B, F, Q, N> SubscriptionOrchestrator<L, B, F, Q, N>
where
    L: LedgerStore,
    B: BillingEngine,
    F: Storefront,
    Q: JobQueue,
    N: Notifier,
{
    /// Cancels one addon subscription.
    #[tracing::instrument(skip(self), fields(subscription = %cmd.subscription_id))]
    pub async fn cancel_subscription(&self, cmd: CancelSubscription) -> Result<CancelOutcome> {
        self.observe("cancel_subscription", async {
            let record = self
                .billing_call(self.billing.get_subscription(&cmd.subscription_id))
                .await?
                .ok_or_else(|| SagaError::not_found("subscription", &cmd.subscription_id))?;
            if record.subscription_type != SubscriptionType::Addon {
                return Err(ValidationError::InvalidSubscriptionType(format!(
                    "{} is a primary subscription; cancel all subscriptions instead",
                    record.id
                ))
                .into());
            }
            let customer_id = record.customer_id.clone();
            self.cancel_records(&customer_id, vec![record]).await
        })
        .await
    }

    /// Cancels the customer's primary subscription and every addon.
    #[tracing::instrument(skip(self), fields(customer = %cmd.customer_id))]
    pub async fn cancel_all_subscriptions(
        &self,
        cmd: CancelAllSubscriptions,
    ) -> Result<CancelOutcome> {
        self.observe("cancel_all_subscriptions", async {
            let records: Vec<SubscriptionRecord> = self
                .billing_call(self.billing.list_subscriptions(&cmd.customer_id))
                .await?
                .into_iter()
                .filter(|s| is_cancellable(s.status))
                .collect();
            if !records
                .iter()
                .any(|s| s.subscription_type == SubscriptionType::Primary)
            {
                return Err(SagaError::not_found("primary subscription", &cmd.customer_id));
            }
            self.cancel_records(&cmd.customer_id, records).await
        })
        .await
    }

    /// Billing cancellations, then one ledger transaction releasing each
    /// cancelled unit while the window is open, then dispatch.
    ///
    /// Dashboard notifications and the survey job follow every successful
    /// billing cancellation whatever the ledger outcome.
    async fn cancel_records(
        &self,
        customer_id: &CustomerId,
        records: Vec<SubscriptionRecord>,
    ) -> Result<CancelOutcome> {
        let mut cancelled = Vec::with_capacity(records.len());
        let mut failure = None;
        for record in records {
            let end_of_term = record.cancel_at_end_of_term();
            match self
                .billing_call(self.billing.cancel_subscription(&record.id, end_of_term))
                .await
            {
                // Keep the metadata we read before cancelling; it names the unit to release.
                Ok(result) => cancelled.push(SubscriptionRecord {
                    status: result.status,
                    ..record
                }),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let mut ledger_mutations = 0;
        let mut receipt = None;
        if !cancelled.is_empty() {
            let cycle = self.active_cycle().await;
            match cycle {
                Ok(Some(cycle)) if self.window(Some(&cycle)).is_open() => {
                    match self.release_cancelled(&cycle, &cancelled).await {
                        Ok((r, n)) => {
                            receipt = Some(r);
                            ledger_mutations = n;
                        }
                        Err(e) => {
                            failure.get_or_insert(e);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        let mut effects = EffectPlan::new();
        for record in &cancelled {
            effects.publish(
                &self.config.dashboard_channel,
                CANCELLED_EVENT,
                json!({
                    "subscriptionId": record.id,
                    "customerId": record.customer_id,
                    "type": record.subscription_type,
                    "track": record.track(),
                }),
            );
        }
        if !cancelled.is_empty() {
            effects.job(
                JobKind::CancellationSurvey,
                json!({
                    "customerId": customer_id,
                    "subscriptionIds": cancelled.iter().map(|s| &s.id).collect::<Vec<_>>(),
                }),
            );
        }
        let committed = match &receipt {
            Some(receipt) => effects.seal(receipt),
            None => effects.without_ledger(),
        };
        let dispatch = self.dispatcher.dispatch(committed).await;

        match failure {
            Some(e) => Err(e),
            None => Ok(CancelOutcome {
                cancelled,
                ledger_mutations,
                dispatch,
            }),
        }
    }

    /// Returns each cancelled unit to the pool it came from: swap stock if the
    /// subscriber swapped, otherwise from the existing to the new-subscriber
    /// pool. Products with no row in the active cycle are skipped.
    async fn release_cancelled(
        &self,
        cycle: &RotationCycle,
        cancelled: &[SubscriptionRecord],
    ) -> Result<(CommitReceipt, usize)> {
        let mut tx = self.store(self.ledger.begin()).await?;
        let mut applied = 0;
        for record in cancelled {
            let Some(product) = record.product() else {
                continue;
            };
            let key = LedgerKey::new(cycle.id.clone(), product.id.clone());
            match self.store(tx.row(&key)).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::warn!(%key, subscription = %record.id, "no ledger row this cycle, skipping release");
                    continue;
                }
                Err(e) => {
                    self.rollback(tx, &e).await;
                    return Err(e);
                }
            }
            let result = if product.swapped {
                tracing::debug!(%key, subscription = %record.id, "releasing swap unit");
                self.store(tx.release_swap(&key)).await
            } else {
                tracing::debug!(%key, subscription = %record.id, "bridging unit back");
                self.store(tx.bridge_back(&key)).await
            };
            if let Err(e) = result {
                self.rollback(tx, &e).await;
                return Err(e);
            }
            applied += 1;
        }
        let receipt = self.store(tx.commit()).await?;
        Ok((receipt, applied))
    }
}

fn is_cancellable(status: SubscriptionStatus) -> bool {
    !matches!(
        status,
        SubscriptionStatus::Cancelled | SubscriptionStatus::NonRenewing
    )
}
