//! Subscription records as seen through the billing engine.
//!
//! The billing engine owns subscription lifecycle; this crate only models what
//! the orchestrator reads and the metadata it asks the engine to store.

use chrono::{DateTime, Utc};
use common::{CustomerId, PlanId, ProductId, SubscriptionId, VariantId};
use serde::{Deserialize, Serialize};

use crate::cycle::SwapWindowSnapshot;
use crate::error::{DomainError, Result};

/// Primary plan versus supplementary addon plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    Primary,
    Addon,
}

impl SubscriptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::Primary => "primary",
            SubscriptionType::Addon => "addon",
        }
    }

    /// Parses request input, ignoring case.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(SubscriptionType::Primary),
            "addon" => Ok(SubscriptionType::Addon),
            _ => Err(DomainError::InvalidSubscriptionType(value.to_string())),
        }
    }
}

impl std::fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing-engine subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    /// Scheduled to start at a future date.
    Future,
    /// Active until the end of the current term, then stops.
    NonRenewing,
    Paused,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Future => "future",
            SubscriptionStatus::NonRenewing => "non_renewing",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    /// Subscriptions that have not started yet are cancelled immediately rather
    /// than at end of term, and never get term-change bridging.
    pub fn is_future(&self) -> bool {
        matches!(self, SubscriptionStatus::Future)
    }

    /// Returns true for statuses that block creating another primary.
    pub fn is_live(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Future)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the subscriber currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductLink {
    pub id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(default)]
    pub swapped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swapped_at: Option<DateTime<Utc>>,
}

/// Gift purchase details, present only on gifted subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftDetails {
    pub recipient_name: String,
    pub recipient_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Metadata the orchestrator stores on billing-engine subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMetadata {
    #[serde(rename = "type")]
    pub subscription_type: SubscriptionType,
    pub product: ProductLink,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_window_snapshot: Option<SwapWindowSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gift: Option<GiftDetails>,
}

impl SubscriptionMetadata {
    /// Decodes metadata received from the billing engine.
    ///
    /// `type` and `product.id` are required; anything else is optional.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        if value.get("type").is_none() {
            return Err(DomainError::MissingMetadataField("type"));
        }
        match value.get("product") {
            Some(product) if product.get("id").is_some() => {}
            Some(_) => return Err(DomainError::MissingMetadataField("product.id")),
            None => return Err(DomainError::MissingMetadataField("product")),
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Encodes metadata for the billing engine.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Returns the track the subscriber is on, if recorded.
    pub fn track(&self) -> Option<&str> {
        self.product.track.as_deref()
    }
}

/// A subscription as reported by the billing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: SubscriptionId,
    pub customer_id: CustomerId,
    pub plan_id: PlanId,
    pub subscription_type: SubscriptionType,
    pub status: SubscriptionStatus,
    pub next_billing_at: Option<DateTime<Utc>>,
    pub metadata: Option<SubscriptionMetadata>,
}

impl SubscriptionRecord {
    /// Whether cancellation should wait until the end of the current term.
    pub fn cancel_at_end_of_term(&self) -> bool {
        !self.status.is_future()
    }

    pub fn track(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.track())
    }

    pub fn product(&self) -> Option<&ProductLink> {
        self.metadata.as_ref().map(|m| &m.product)
    }
}
