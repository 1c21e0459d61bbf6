use domain::TermChange;
use ledger::LedgerStore;

use super::SubscriptionOrchestrator;
use crate::commands::{TermChangeOutcome, UpdateSubscriptionTerm};
use crate::error::{Result, SagaError};
use crate::services::{BillingEngine, JobQueue, Notifier, Storefront, SubscriptionUpdate};

impl<L, B, F, Q, N> SubscriptionOrchestrator<L, B, F, Q, N>
where
    L: LedgerStore,
    B: BillingEngine,
    F: Storefront,
    Q: JobQueue,
    N: Notifier,
{
    /// Moves the customer's primary subscription to another plan, attaching the
    /// bridging coupon when the renewal falls near a month boundary. Never
    /// touches the ledger.
    #[tracing::instrument(skip(self), fields(customer = %cmd.customer_id, plan = %cmd.plan_id))]
    pub async fn update_subscription_term(
        &self,
        cmd: UpdateSubscriptionTerm,
    ) -> Result<TermChangeOutcome> {
        self.observe("update_subscription_term", async {
            let plan = self
                .billing_call(self.billing.get_plan(&cmd.plan_id))
                .await?
                .ok_or_else(|| SagaError::not_found("plan", &cmd.plan_id))?;
            let primary = self.primary_of(&cmd.customer_id).await?;

            let coupon = self.config.coupons.bridging_coupon(
                TermChange {
                    plan: &plan,
                    status: primary.status,
                    next_billing_at: primary.next_billing_at,
                },
                &self.config.calendar,
                &self.config.plan_rules,
            );

            let updated = self
                .billing_call(self.billing.update_subscription(
                    &primary.id,
                    SubscriptionUpdate {
                        plan_id: Some(plan.id.clone()),
                        end_of_term: Some(primary.cancel_at_end_of_term()),
                        coupon_ids: coupon.clone().map(|c| vec![c]),
                        ..SubscriptionUpdate::default()
                    },
                ))
                .await?;

            Ok(TermChangeOutcome {
                subscription: updated.subscription,
                bridging_coupon: coupon,
            })
        })
        .await
    }
}
