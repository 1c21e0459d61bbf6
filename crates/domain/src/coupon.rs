//! Coupon eligibility and term-change bridging discounts.

use chrono::{DateTime, Utc};

use crate::error::{DomainError, Result};
use crate::plan::{Plan, PlanRules};
use crate::schedule::BillingCalendar;
use crate::subscription::SubscriptionStatus;

/// Coupon rules applied at subscription creation and term changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponPolicy {
    /// Code prefixes reserved for internal or promotional use.
    pub excluded_prefixes: Vec<String>,
    /// Coupon applied when a multi-month term change lands near a month boundary.
    pub bridging_coupon: String,
    /// Maximum distance, in days, between the next billing date and a month
    /// boundary for the bridging coupon to apply.
    pub bridging_window_days: u32,
}

impl Default for CouponPolicy {
    fn default() -> Self {
        Self {
            excluded_prefixes: vec!["internal".to_string(), "promo".to_string()],
            bridging_coupon: "term-bridge".to_string(),
            bridging_window_days: 3,
        }
    }
}

/// Inputs for the bridging discount decision.
#[derive(Debug, Clone, Copy)]
pub struct TermChange<'a> {
    pub plan: &'a Plan,
    pub status: SubscriptionStatus,
    pub next_billing_at: Option<DateTime<Utc>>,
}

impl CouponPolicy {
    /// Rejects internal and promotional codes. Blank codes are treated as absent.
    pub fn check_eligible(&self, code: &str) -> Result<()> {
        let normalized = code.trim().to_ascii_lowercase();
        if self
            .excluded_prefixes
            .iter()
            .any(|prefix| normalized.starts_with(&prefix.to_ascii_lowercase()))
        {
            return Err(DomainError::IneligibleCoupon(code.to_string()));
        }
        Ok(())
    }

    /// Returns the bridging coupon for a term change, if one applies.
    ///
    /// All must hold: the next billing date is within the window around a month
    /// boundary, the new plan spans more than one month, the subscription has
    /// already started, and the plan is not a new-customer plan.
    pub fn bridging_coupon(
        &self,
        change: TermChange<'_>,
        calendar: &BillingCalendar,
        rules: &PlanRules,
    ) -> Option<String> {
        let next_billing_at = change.next_billing_at?;
        let near_boundary =
            calendar.days_from_month_boundary(next_billing_at) <= self.bridging_window_days;

        if near_boundary
            && change.plan.period > 1
            && !change.status.is_future()
            && !rules.is_new_customer_plan(&change.plan.id)
        {
            Some(self.bridging_coupon.clone())
        } else {
            None
        }
    }

    /// Filters request coupons down to eligible ones, failing on the first
    /// ineligible code.
    pub fn eligible_coupons(&self, codes: &[String]) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(codes.len());
        for code in codes {
            if code.trim().is_empty() {
                continue;
            }
            self.check_eligible(code)?;
            out.push(code.trim().to_string());
        }
        Ok(out)
    }
}
