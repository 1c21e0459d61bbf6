//! Plan id conventions.

use common::PlanId;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// A billing-engine plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    /// Billing period length in months.
    pub period: u32,
}

/// Interprets the naming conventions encoded in plan ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRules {
    /// ISO country code treated as domestic shipping.
    pub domestic_country: String,
    /// Suffix carried by every international plan id.
    pub international_suffix: String,
    /// Substring identifying introductory new-customer plans.
    pub new_customer_marker: String,
}

impl Default for PlanRules {
    fn default() -> Self {
        Self {
            domestic_country: "US".to_string(),
            international_suffix: "-intl".to_string(),
            new_customer_marker: "new-customer".to_string(),
        }
    }
}

impl PlanRules {
    pub fn is_domestic(&self, country: &str) -> bool {
        country.trim().eq_ignore_ascii_case(&self.domestic_country)
    }

    pub fn is_international_plan(&self, plan: &PlanId) -> bool {
        plan.as_str()
            .to_ascii_lowercase()
            .ends_with(&self.international_suffix.to_ascii_lowercase())
    }

    pub fn is_new_customer_plan(&self, plan: &PlanId) -> bool {
        plan.as_str()
            .to_ascii_lowercase()
            .contains(&self.new_customer_marker.to_ascii_lowercase())
    }

    /// Rejects a primary plan whose suffix disagrees with the shipping country.
    pub fn check_plan_country(&self, plan: &PlanId, country: &str) -> Result<()> {
        if self.is_domestic(country) == self.is_international_plan(plan) {
            return Err(DomainError::PlanCountryMismatch {
                plan: plan.to_string(),
                country: country.to_string(),
            });
        }
        Ok(())
    }

    /// Picks the addon plan matching the shipping country from the engine's
    /// addon catalog.
    pub fn select_addon_plan<'a>(&self, plans: &'a [PlanId], country: &str) -> Option<&'a PlanId> {
        let want_international = !self.is_domestic(country);
        plans
            .iter()
            .find(|p| self.is_international_plan(p) == want_international)
    }
}
