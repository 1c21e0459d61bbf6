//! Saga configuration.

use std::collections::HashSet;
use std::time::Duration;

use common::ProductId;
use domain::{BillingCalendar, CouponPolicy, PlanRules};

/// Business rules and deadlines shared by every saga.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Reference timezone for month boundaries.
    pub calendar: BillingCalendar,
    pub plan_rules: PlanRules,
    pub coupons: CouponPolicy,
    /// Products swapped via account credit. These never touch the ledger.
    pub credit_swap_products: HashSet<ProductId>,
    /// Storefront tag given to every primary subscriber.
    pub membership_tag: String,
    /// Real-time channel for operator dashboards.
    pub dashboard_channel: String,
    pub store_timeout: Duration,
    pub billing_timeout: Duration,
    pub dispatch_timeout: Duration,
}

impl SagaConfig {
    pub fn is_credit_swap_product(&self, product: &ProductId) -> bool {
        self.credit_swap_products.contains(product)
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            calendar: BillingCalendar::default(),
            plan_rules: PlanRules::default(),
            coupons: CouponPolicy::default(),
            credit_swap_products: HashSet::new(),
            membership_tag: "member".to_string(),
            dashboard_channel: "subscription-dashboard".to_string(),
            store_timeout: Duration::from_secs(5),
            billing_timeout: Duration::from_secs(10),
            dispatch_timeout: Duration::from_secs(5),
        }
    }
}
