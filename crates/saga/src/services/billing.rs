//! Billing engine trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use common::{CustomerId, PlanId, SubscriptionId};
use domain::{
    Plan, SubscriptionMetadata, SubscriptionRecord, SubscriptionStatus, SubscriptionType,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SagaError};

/// A customer account in the billing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCustomer {
    pub id: CustomerId,
    pub email: Option<String>,
}

/// Parameters for a new subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub plan_id: PlanId,
    pub coupon_ids: Vec<String>,
    /// `None` starts the subscription immediately.
    pub start_date: Option<DateTime<Utc>>,
    pub metadata: SubscriptionMetadata,
}

/// Partial update of a subscription. Absent fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionUpdate {
    pub metadata: Option<SubscriptionMetadata>,
    pub plan_id: Option<PlanId>,
    pub end_of_term: Option<bool>,
    pub coupon_ids: Option<Vec<String>>,
}

impl SubscriptionUpdate {
    pub fn metadata(metadata: SubscriptionMetadata) -> Self {
        Self {
            metadata: Some(metadata),
            ..Self::default()
        }
    }
}

/// Result of [`BillingEngine::update_subscription`].
#[derive(Debug, Clone)]
pub struct UpdatedSubscription {
    pub subscription: SubscriptionRecord,
    pub customer: Option<BillingCustomer>,
}

/// Next charge for a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalEstimate {
    pub subscription_id: SubscriptionId,
    pub plan_id: PlanId,
    pub next_billing_at: Option<DateTime<Utc>>,
    pub coupon_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub subscription_id: SubscriptionId,
    pub issued_at: DateTime<Utc>,
    pub total_cents: i64,
}

/// External billing engine. Owns subscription records; the saga only reads
/// them and requests mutations.
///
/// Implementations validate subscription metadata at this boundary: a record
/// whose metadata lacks required fields surfaces as an integrity error.
#[async_trait]
pub trait BillingEngine: Send + Sync {
    async fn list_subscriptions(&self, customer_id: &CustomerId) -> Result<Vec<SubscriptionRecord>>;

    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<SubscriptionRecord>>;

    async fn create_subscription(
        &self,
        customer_id: &CustomerId,
        params: NewSubscription,
    ) -> Result<SubscriptionRecord>;

    async fn update_subscription(
        &self,
        id: &SubscriptionId,
        update: SubscriptionUpdate,
    ) -> Result<UpdatedSubscription>;

    async fn cancel_subscription(
        &self,
        id: &SubscriptionId,
        end_of_term: bool,
    ) -> Result<SubscriptionRecord>;

    async fn reactivate_subscription(&self, id: &SubscriptionId) -> Result<SubscriptionRecord>;

    async fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>>;

    async fn get_renewal_estimate(&self, id: &SubscriptionId) -> Result<Option<RenewalEstimate>>;

    async fn get_latest_invoice(&self, id: &SubscriptionId) -> Result<Option<Invoice>>;

    async fn get_invoice_download_url(&self, invoice_id: &str) -> Result<Option<String>>;

    /// Every plan sellable as an addon.
    async fn list_addon_plans(&self) -> Result<Vec<PlanId>>;

    async fn get_customer_by_email(&self, email: &str) -> Result<Option<BillingCustomer>>;
}

/// A subscription as the engine stores it, with metadata still untyped.
#[derive(Debug, Clone)]
struct StoredSubscription {
    id: SubscriptionId,
    customer_id: CustomerId,
    plan_id: PlanId,
    subscription_type: SubscriptionType,
    status: SubscriptionStatus,
    next_billing_at: Option<DateTime<Utc>>,
    coupon_ids: Vec<String>,
    metadata: Option<Value>,
}

impl StoredSubscription {
    fn to_record(&self) -> Result<SubscriptionRecord> {
        let metadata = self
            .metadata
            .as_ref()
            .map(SubscriptionMetadata::from_json)
            .transpose()?;
        Ok(SubscriptionRecord {
            id: self.id.clone(),
            customer_id: self.customer_id.clone(),
            plan_id: self.plan_id.clone(),
            subscription_type: self.subscription_type,
            status: self.status,
            next_billing_at: self.next_billing_at,
            metadata,
        })
    }
}

#[derive(Debug, Default)]
struct InMemoryBillingState {
    subscriptions: Vec<StoredSubscription>,
    customers: HashMap<CustomerId, BillingCustomer>,
    plans: HashMap<PlanId, Plan>,
    addon_plans: Vec<PlanId>,
    invoices: HashMap<SubscriptionId, Invoice>,
    cancellations: Vec<(SubscriptionId, bool)>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_update: bool,
    fail_on_cancel: bool,
}

impl InMemoryBillingState {
    fn find_mut(&mut self, id: &SubscriptionId) -> Result<&mut StoredSubscription> {
        self.subscriptions
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| SagaError::not_found("subscription", id))
    }
}

/// In-memory billing engine for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBillingEngine {
    state: Arc<RwLock<InMemoryBillingState>>,
}

impl InMemoryBillingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryBillingState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryBillingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put_customer(&self, id: impl Into<CustomerId>, email: Option<&str>) {
        let id = id.into();
        self.write().customers.insert(
            id.clone(),
            BillingCustomer {
                id,
                email: email.map(str::to_string),
            },
        );
    }

    pub fn put_plan(&self, plan: Plan) {
        self.write().plans.insert(plan.id.clone(), plan);
    }

    /// Registers a plan and lists it in the addon catalog.
    pub fn put_addon_plan(&self, plan: Plan) {
        let mut state = self.write();
        state.addon_plans.push(plan.id.clone());
        state.plans.insert(plan.id.clone(), plan);
    }

    /// Inserts an existing subscription as the engine would report it.
    pub fn put_subscription(&self, record: SubscriptionRecord) -> Result<()> {
        let metadata = record.metadata.as_ref().map(|m| m.to_json()).transpose()?;
        self.write().subscriptions.push(StoredSubscription {
            id: record.id,
            customer_id: record.customer_id,
            plan_id: record.plan_id,
            subscription_type: record.subscription_type,
            status: record.status,
            next_billing_at: record.next_billing_at,
            coupon_ids: Vec::new(),
            metadata,
        });
        Ok(())
    }

    /// Overwrites the raw metadata of a subscription.
    pub fn put_raw_metadata(&self, id: &SubscriptionId, metadata: Value) {
        if let Ok(sub) = self.write().find_mut(id) {
            sub.metadata = Some(metadata);
        }
    }

    pub fn put_invoice(&self, invoice: Invoice) {
        self.write()
            .invoices
            .insert(invoice.subscription_id.clone(), invoice);
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        self.write().fail_on_create = fail;
    }

    pub fn set_fail_on_update(&self, fail: bool) {
        self.write().fail_on_update = fail;
    }

    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.write().fail_on_cancel = fail;
    }

    pub fn subscription_count(&self) -> usize {
        self.read().subscriptions.len()
    }

    /// Every cancellation request received, with its `end_of_term` flag.
    pub fn cancellations(&self) -> Vec<(SubscriptionId, bool)> {
        self.read().cancellations.clone()
    }

    pub fn coupons_of(&self, id: &SubscriptionId) -> Vec<String> {
        self.read()
            .subscriptions
            .iter()
            .find(|s| &s.id == id)
            .map(|s| s.coupon_ids.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BillingEngine for InMemoryBillingEngine {
    async fn list_subscriptions(&self, customer_id: &CustomerId) -> Result<Vec<SubscriptionRecord>> {
        self.read()
            .subscriptions
            .iter()
            .filter(|s| &s.customer_id == customer_id)
            .map(StoredSubscription::to_record)
            .collect()
    }

    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<SubscriptionRecord>> {
        self.read()
            .subscriptions
            .iter()
            .find(|s| &s.id == id)
            .map(StoredSubscription::to_record)
            .transpose()
    }

    async fn create_subscription(
        &self,
        customer_id: &CustomerId,
        params: NewSubscription,
    ) -> Result<SubscriptionRecord> {
        let metadata = params.metadata.to_json()?;
        let mut state = self.write();

        if state.fail_on_create {
            return Err(SagaError::external("billing", "subscription creation rejected"));
        }

        let period = state.plans.get(&params.plan_id).map_or(1, |p| p.period);
        let starts_at = params.start_date.unwrap_or_else(Utc::now);
        state.next_id += 1;
        let stored = StoredSubscription {
            id: SubscriptionId::new(format!("SUB-{:04}", state.next_id)),
            customer_id: customer_id.clone(),
            plan_id: params.plan_id,
            subscription_type: params.metadata.subscription_type,
            status: if params.start_date.is_some() {
                SubscriptionStatus::Future
            } else {
                SubscriptionStatus::Active
            },
            next_billing_at: starts_at.checked_add_months(Months::new(period)),
            coupon_ids: params.coupon_ids,
            metadata: Some(metadata),
        };
        let record = stored.to_record()?;
        state.subscriptions.push(stored);
        Ok(record)
    }

    async fn update_subscription(
        &self,
        id: &SubscriptionId,
        update: SubscriptionUpdate,
    ) -> Result<UpdatedSubscription> {
        let metadata = update.metadata.as_ref().map(|m| m.to_json()).transpose()?;
        let mut state = self.write();

        if state.fail_on_update {
            return Err(SagaError::external("billing", "subscription update rejected"));
        }

        let sub = state.find_mut(id)?;
        if let Some(metadata) = metadata {
            sub.metadata = Some(metadata);
        }
        if let Some(plan_id) = update.plan_id {
            sub.plan_id = plan_id;
        }
        if let Some(coupon_ids) = update.coupon_ids {
            sub.coupon_ids = coupon_ids;
        }
        let subscription = sub.to_record()?;
        let customer = state.customers.get(&subscription.customer_id).cloned();
        Ok(UpdatedSubscription {
            subscription,
            customer,
        })
    }

    async fn cancel_subscription(
        &self,
        id: &SubscriptionId,
        end_of_term: bool,
    ) -> Result<SubscriptionRecord> {
        let mut state = self.write();

        if state.fail_on_cancel {
            return Err(SagaError::external("billing", "cancellation rejected"));
        }

        let sub = state.find_mut(id)?;
        sub.status = if end_of_term {
            SubscriptionStatus::NonRenewing
        } else {
            SubscriptionStatus::Cancelled
        };
        let record = sub.to_record()?;
        state.cancellations.push((id.clone(), end_of_term));
        Ok(record)
    }

    async fn reactivate_subscription(&self, id: &SubscriptionId) -> Result<SubscriptionRecord> {
        let mut state = self.write();
        let sub = state.find_mut(id)?;
        sub.status = SubscriptionStatus::Active;
        sub.to_record()
    }

    async fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>> {
        Ok(self.read().plans.get(id).cloned())
    }

    async fn get_renewal_estimate(&self, id: &SubscriptionId) -> Result<Option<RenewalEstimate>> {
        Ok(self
            .read()
            .subscriptions
            .iter()
            .find(|s| &s.id == id && s.status != SubscriptionStatus::Cancelled)
            .map(|s| RenewalEstimate {
                subscription_id: s.id.clone(),
                plan_id: s.plan_id.clone(),
                next_billing_at: s.next_billing_at,
                coupon_ids: s.coupon_ids.clone(),
            }))
    }

    async fn get_latest_invoice(&self, id: &SubscriptionId) -> Result<Option<Invoice>> {
        Ok(self.read().invoices.get(id).cloned())
    }

    async fn get_invoice_download_url(&self, invoice_id: &str) -> Result<Option<String>> {
        let known = self.read().invoices.values().any(|i| i.id == invoice_id);
        Ok(known.then(|| format!("https://billing.example.com/invoices/{invoice_id}.pdf")))
    }

    async fn list_addon_plans(&self) -> Result<Vec<PlanId>> {
        Ok(self.read().addon_plans.clone())
    }

    async fn get_customer_by_email(&self, email: &str) -> Result<Option<BillingCustomer>> {
        Ok(self
            .read()
            .customers
            .values()
            .find(|c| {
                c.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email.trim()))
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;
    use domain::ProductLink;
    use serde_json::json;

    fn metadata(subscription_type: SubscriptionType) -> SubscriptionMetadata {
        SubscriptionMetadata {
            subscription_type,
            product: ProductLink {
                id: ProductId::new("prod-1"),
                variant_id: None,
                track: Some("fiction".into()),
                swapped: false,
                swapped_at: None,
            },
            swap_window_snapshot: None,
            gift: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let billing = InMemoryBillingEngine::new();
        let customer = CustomerId::new("cus-1");

        let created = billing
            .create_subscription(
                &customer,
                NewSubscription {
                    plan_id: PlanId::new("monthly"),
                    coupon_ids: vec![],
                    start_date: None,
                    metadata: metadata(SubscriptionType::Primary),
                },
            )
            .await
            .unwrap();
        assert_eq!(created.status, SubscriptionStatus::Active);
        assert_eq!(created.track(), Some("fiction"));

        let listed = billing.list_subscriptions(&customer).await.unwrap();
        assert_eq!(listed, vec![created]);
    }

    #[tokio::test]
    async fn test_future_start_date_creates_future_subscription() {
        let billing = InMemoryBillingEngine::new();
        let created = billing
            .create_subscription(
                &CustomerId::new("cus-1"),
                NewSubscription {
                    plan_id: PlanId::new("addon"),
                    coupon_ids: vec![],
                    start_date: Some(Utc::now()),
                    metadata: metadata(SubscriptionType::Addon),
                },
            )
            .await
            .unwrap();
        assert!(created.status.is_future());
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_integrity_error() {
        let billing = InMemoryBillingEngine::new();
        let created = billing
            .create_subscription(
                &CustomerId::new("cus-1"),
                NewSubscription {
                    plan_id: PlanId::new("monthly"),
                    coupon_ids: vec![],
                    start_date: None,
                    metadata: metadata(SubscriptionType::Primary),
                },
            )
            .await
            .unwrap();
        billing.put_raw_metadata(&created.id, json!({ "type": "primary" }));

        let err = billing.get_subscription(&created.id).await.unwrap_err();
        assert_eq!(err.kind(), "integrity");
    }

    #[tokio::test]
    async fn test_cancel_records_end_of_term() {
        let billing = InMemoryBillingEngine::new();
        let created = billing
            .create_subscription(
                &CustomerId::new("cus-1"),
                NewSubscription {
                    plan_id: PlanId::new("monthly"),
                    coupon_ids: vec![],
                    start_date: None,
                    metadata: metadata(SubscriptionType::Primary),
                },
            )
            .await
            .unwrap();

        let cancelled = billing.cancel_subscription(&created.id, true).await.unwrap();
        assert_eq!(cancelled.status, SubscriptionStatus::NonRenewing);
        assert_eq!(billing.cancellations(), vec![(created.id.clone(), true)]);

        let reactivated = billing.reactivate_subscription(&created.id).await.unwrap();
        assert_eq!(reactivated.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_fail_on_update() {
        let billing = InMemoryBillingEngine::new();
        billing.set_fail_on_update(true);
        let result = billing
            .update_subscription(&SubscriptionId::new("SUB-0001"), SubscriptionUpdate::default())
            .await;
        assert!(matches!(result, Err(SagaError::ExternalService { .. })));
    }

    #[tokio::test]
    async fn test_customer_lookup_by_email_is_case_insensitive() {
        let billing = InMemoryBillingEngine::new();
        billing.put_customer("cus-1", Some("Reader@Example.com"));

        let found = billing
            .get_customer_by_email("reader@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id.as_str(), "cus-1");
        assert!(billing.get_customer_by_email("nobody@example.com").await.unwrap().is_none());
    }
}
