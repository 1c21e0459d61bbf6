//! Customer read endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use common::CustomerId;
use ledger::LedgerStore;
use saga::BillingCustomer;
use serde::{Deserialize, Serialize};

use super::ok;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CustomerBody {
    pub customer: BillingCustomer,
}

/// GET /customers?email= — billing customer lookup.
pub async fn find_by_email<L: LedgerStore + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Query(query): Query<EmailQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let customer = state
        .orchestrator
        .find_customer_by_email(&query.email)
        .await?;
    Ok(ok(CustomerBody { customer }))
}

/// GET /customers/{id}/subscriptions — subscriptions, renewal and window state.
pub async fn subscriptions<L: LedgerStore + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let overview = state
        .orchestrator
        .subscription_overview(&CustomerId::new(id))
        .await?;
    Ok(ok(overview))
}
