//! HTTP route handlers.

pub mod customers;
pub mod health;
pub mod metrics;
pub mod subscriptions;

use axum::Json;
use serde::Serialize;

/// Success envelope: `{ "success": true, ...body }`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

pub fn ok<T: Serialize>(body: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        body,
    })
}
