use common::{CustomerId, SubscriptionId};
use domain::{SubscriptionType, SwapWindowSnapshot};
use ledger::LedgerStore;

use super::SubscriptionOrchestrator;
use crate::commands::{InvoiceLink, SubscriptionOverview, SwapWindowView};
use crate::error::{Result, SagaError, ValidationError};
use crate::services::{BillingCustomer, BillingEngine, JobQueue, Notifier, Storefront};

impl<L, B, F, Q, N> SubscriptionOrchestrator<L, B, F, Q, N>
where
    L: LedgerStore,
    B: BillingEngine,
    F: Storefront,
    Q: JobQueue,
    N: Notifier,
{
    /// Current swap window. Without an active cycle the window is closed.
    pub async fn swap_window(&self) -> Result<SwapWindowView> {
        let cycle = self.active_cycle().await?;
        let now = self.clock.now();
        Ok(SwapWindowView {
            state: self.window(cycle.as_ref()),
            window: cycle.as_ref().map(|c| SwapWindowSnapshot::capture(c, now)),
        })
    }

    /// Every subscription of a customer, with the primary's next renewal.
    #[tracing::instrument(skip(self))]
    pub async fn subscription_overview(&self, customer_id: &CustomerId) -> Result<SubscriptionOverview> {
        self.observe("subscription_overview", async {
            let subscriptions = self
                .billing_call(self.billing.list_subscriptions(customer_id))
                .await?;
            if subscriptions.is_empty() {
                return Err(SagaError::not_found("customer subscriptions", customer_id));
            }
            let renewal = match subscriptions
                .iter()
                .find(|s| s.subscription_type == SubscriptionType::Primary && s.status.is_live())
            {
                Some(primary) => {
                    self.billing_call(self.billing.get_renewal_estimate(&primary.id))
                        .await?
                }
                None => None,
            };
            let cycle = self.active_cycle().await?;

            Ok(SubscriptionOverview {
                customer_id: customer_id.clone(),
                subscriptions,
                renewal,
                swap_window: self.window(cycle.as_ref()),
            })
        })
        .await
    }

    /// Download link for the most recent invoice of a subscription.
    #[tracing::instrument(skip(self))]
    pub async fn latest_invoice_url(&self, subscription_id: &SubscriptionId) -> Result<InvoiceLink> {
        self.observe("latest_invoice_url", async {
            let invoice = self
                .billing_call(self.billing.get_latest_invoice(subscription_id))
                .await?
                .ok_or_else(|| SagaError::not_found("invoice", subscription_id))?;
            let url = self
                .billing_call(self.billing.get_invoice_download_url(&invoice.id))
                .await?
                .ok_or_else(|| {
                    SagaError::Integrity(format!("invoice {} has no download url", invoice.id))
                })?;
            Ok(InvoiceLink {
                invoice_id: invoice.id,
                url,
            })
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_customer_by_email(&self, email: &str) -> Result<BillingCustomer> {
        self.observe("find_customer_by_email", async {
            if email.trim().is_empty() {
                return Err(ValidationError::MissingField("email").into());
            }
            self.billing_call(self.billing.get_customer_by_email(email))
                .await?
                .ok_or_else(|| SagaError::not_found("customer", email))
        })
        .await
    }
}
