use domain::SubscriptionType;
use ledger::LedgerStore;
use serde_json::json;

use super::SubscriptionOrchestrator;
use crate::commands::{ReactivateOutcome, ReactivateSubscription};
use crate::dispatcher::EffectPlan;
use crate::error::{Result, SagaError};
use crate::jobs::JobKind;
use crate::services::{BillingEngine, JobQueue, Notifier, Storefront};

impl<L, B, F, Q, N> SubscriptionOrchestrator<L, B, F, Q, N>
where
    L: LedgerStore,
    B: BillingEngine,
    F: Storefront,
    Q: JobQueue,
    N: Notifier,
{
    /// Reactivates a cancelled or non-renewing subscription. Reactivating a
    /// primary also withdraws the pending cancellation survey.
    #[tracing::instrument(skip(self), fields(subscription = %cmd.subscription_id))]
    pub async fn reactivate_subscription(
        &self,
        cmd: ReactivateSubscription,
    ) -> Result<ReactivateOutcome> {
        self.observe("reactivate_subscription", async {
            let record = self
                .billing_call(self.billing.get_subscription(&cmd.subscription_id))
                .await?
                .ok_or_else(|| SagaError::not_found("subscription", &cmd.subscription_id))?;
            let subscription = self
                .billing_call(self.billing.reactivate_subscription(&record.id))
                .await?;

            let mut effects = EffectPlan::new();
            if record.subscription_type == SubscriptionType::Primary {
                effects.job(
                    JobKind::SurveyDeactivation,
                    json!({
                        "customerId": cmd.customer_id,
                        "subscriptionId": subscription.id,
                    }),
                );
            }
            let dispatch = self.dispatcher.dispatch(effects.without_ledger()).await;

            Ok(ReactivateOutcome {
                subscription,
                dispatch,
            })
        })
        .await
    }
}
