//! Subscription lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::{CustomerId, ProductId, SubscriptionId, VariantId};
use ledger::LedgerStore;
use saga::{
    CancelAllSubscriptions, CancelSubscription, CreateSubscription, ReactivateSubscription,
    SwapSubscriptionRecord, UpdateSubscriptionTerm, UpdateSubscriptionTrack,
};
use serde::Deserialize;

use super::ok;
use crate::AppState;
use crate::error::ApiError;

/// Unwraps a JSON body, reporting malformed input in the error envelope.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactivateRequest {
    pub customer_id: CustomerId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub from_product: ProductId,
    pub to_product: ProductId,
    #[serde(default)]
    pub to_variant: Option<VariantId>,
    pub track: String,
    #[serde(default)]
    pub is_credit_swap: bool,
}

/// GET /swap-window — current swap window state.
pub async fn swap_window<L: LedgerStore + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.orchestrator.swap_window().await?;
    Ok(ok(view))
}

/// POST /subscriptions — create a primary or addon subscription.
pub async fn create<L: LedgerStore + 'static>(
    State(state): State<Arc<AppState<L>>>,
    payload: Result<Json<CreateSubscription>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let cmd = body(payload)?;
    let outcome = state.orchestrator.create_subscription(cmd).await?;
    Ok((StatusCode::CREATED, ok(outcome)))
}

/// PUT /subscriptions/track — move the primary subscription to another track.
pub async fn update_track<L: LedgerStore + 'static>(
    State(state): State<Arc<AppState<L>>>,
    payload: Result<Json<UpdateSubscriptionTrack>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let cmd = body(payload)?;
    let outcome = state.orchestrator.update_subscription_track(cmd).await?;
    Ok(ok(outcome))
}

/// PUT /subscriptions/term — move the primary subscription to another plan.
pub async fn update_term<L: LedgerStore + 'static>(
    State(state): State<Arc<AppState<L>>>,
    payload: Result<Json<UpdateSubscriptionTerm>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let cmd = body(payload)?;
    let outcome = state.orchestrator.update_subscription_term(cmd).await?;
    Ok(ok(outcome))
}

/// POST /subscriptions/{id}/cancel — cancel one addon.
pub async fn cancel<L: LedgerStore + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .orchestrator
        .cancel_subscription(CancelSubscription {
            subscription_id: SubscriptionId::new(id),
        })
        .await?;
    Ok(ok(outcome))
}

/// POST /subscriptions/cancel-all — cancel the primary and every addon.
pub async fn cancel_all<L: LedgerStore + 'static>(
    State(state): State<Arc<AppState<L>>>,
    payload: Result<Json<CancelAllSubscriptions>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let cmd = body(payload)?;
    let outcome = state.orchestrator.cancel_all_subscriptions(cmd).await?;
    Ok(ok(outcome))
}

/// POST /subscriptions/{id}/reactivate
pub async fn reactivate<L: LedgerStore + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
    payload: Result<Json<ReactivateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body(payload)?;
    let outcome = state
        .orchestrator
        .reactivate_subscription(ReactivateSubscription {
            subscription_id: SubscriptionId::new(id),
            customer_id: request.customer_id,
        })
        .await?;
    Ok(ok(outcome))
}

/// POST /subscriptions/{id}/swap — exchange the held product.
pub async fn swap<L: LedgerStore + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
    payload: Result<Json<SwapRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body(payload)?;
    let outcome = state
        .orchestrator
        .swap_subscription_record(SwapSubscriptionRecord {
            subscription_id: SubscriptionId::new(id),
            from_product: request.from_product,
            to_product: request.to_product,
            to_variant: request.to_variant,
            track: request.track,
            is_credit_swap: request.is_credit_swap,
        })
        .await?;
    Ok(ok(outcome))
}

/// GET /subscriptions/{id}/invoice — download link for the latest invoice.
pub async fn invoice<L: LedgerStore + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let link = state
        .orchestrator
        .latest_invoice_url(&SubscriptionId::new(id))
        .await?;
    Ok(ok(link))
}
