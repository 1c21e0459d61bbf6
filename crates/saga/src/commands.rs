//! Saga inputs and outcomes.

use common::{CustomerId, PlanId, ProductId, StorefrontCustomerId, SubscriptionId, VariantId};
use domain::{GiftDetails, SubscriptionRecord, SwapWindowSnapshot, SwapWindowState};
use serde::{Deserialize, Serialize};

use crate::dispatcher::DispatchReport;
use crate::services::RenewalEstimate;

/// Creates a primary or addon subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscription {
    /// `primary` or `addon`; validated by the saga.
    pub subscription_type: String,
    pub track: String,
    pub customer_id: CustomerId,
    pub storefront_customer_id: StorefrontCustomerId,
    /// Required for primaries. Addon plans are chosen by shipping country.
    #[serde(default)]
    pub plan_id: Option<PlanId>,
    #[serde(default)]
    pub coupon_ids: Vec<String>,
    /// Extra tracks to subscribe to alongside a primary.
    #[serde(default)]
    pub addon_tracks: Vec<String>,
    /// Overrides the track's default product for this cycle.
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    #[serde(default)]
    pub gift: Option<GiftDetails>,
}

/// Moves a customer's primary subscription to another track.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubscriptionTrack {
    pub customer_id: CustomerId,
    /// Falls back to the track on record when blank.
    #[serde(default)]
    pub previous_track: String,
    pub new_track: String,
    /// Whether the subscriber already swapped this cycle.
    #[serde(default)]
    pub have_swapped: bool,
}

/// Moves a customer's primary subscription to another plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubscriptionTerm {
    pub customer_id: CustomerId,
    pub plan_id: PlanId,
}

/// Cancels a single addon subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscription {
    pub subscription_id: SubscriptionId,
}

/// Cancels a customer's primary and every addon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAllSubscriptions {
    pub customer_id: CustomerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactivateSubscription {
    pub subscription_id: SubscriptionId,
    pub customer_id: CustomerId,
}

/// Exchanges the product held by a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapSubscriptionRecord {
    pub subscription_id: SubscriptionId,
    pub from_product: ProductId,
    pub to_product: ProductId,
    #[serde(default)]
    pub to_variant: Option<VariantId>,
    pub track: String,
    /// Paid for with account credit instead of swap stock.
    #[serde(default)]
    pub is_credit_swap: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOutcome {
    pub subscription: SubscriptionRecord,
    pub addons: Vec<SubscriptionRecord>,
    pub swap_window: SwapWindowState,
    pub dispatch: DispatchReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackChangeOutcome {
    pub subscription: SubscriptionRecord,
    pub swap_window: SwapWindowState,
    pub ledger_mutations: usize,
    pub dispatch: DispatchReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermChangeOutcome {
    pub subscription: SubscriptionRecord,
    pub bridging_coupon: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub cancelled: Vec<SubscriptionRecord>,
    pub ledger_mutations: usize,
    pub dispatch: DispatchReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactivateOutcome {
    pub subscription: SubscriptionRecord,
    pub dispatch: DispatchReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapOutcome {
    pub subscription: SubscriptionRecord,
    pub credit_swap: bool,
    pub dispatch: DispatchReport,
}

/// Current swap window, as reported to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapWindowView {
    pub state: SwapWindowState,
    pub window: Option<SwapWindowSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionOverview {
    pub customer_id: CustomerId,
    pub subscriptions: Vec<SubscriptionRecord>,
    pub renewal: Option<RenewalEstimate>,
    pub swap_window: SwapWindowState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLink {
    pub invoice_id: String,
    pub url: String,
}
