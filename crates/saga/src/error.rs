//! Saga error types.

use common::{CycleId, ProductId, SubscriptionId};
use domain::DomainError;
use ledger::{LedgerError, Pool};
use thiserror::Error;

/// Input problems detected before any ledger transaction opens.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid track: {0:?}")]
    InvalidTrack(String),

    #[error("Invalid subscription type: {0:?}")]
    InvalidSubscriptionType(String),

    #[error("Coupon {0} is not eligible")]
    IneligibleCoupon(String),

    #[error("Plan {plan} does not match shipping country {country}")]
    PlanCountryMismatch { plan: String, country: String },

    #[error("Duplicate subscription: {0}")]
    DuplicateSubscription(String),

    #[error("Subscription {0} has no track on record")]
    MissingTrack(SubscriptionId),

    #[error("Swap window for cycle {0} is closed")]
    SwapWindowClosed(CycleId),
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Missing or invalid input.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A subscription, plan, customer, cycle or ledger row is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A guarded reservation matched no row, or a storefront variant is sold
    /// out. Credit swaps may run without an active cycle.
    #[error("Out of stock: {pool} pool for {product}")]
    OutOfStock {
        cycle: Option<CycleId>,
        product: ProductId,
        pool: Pool,
    },

    /// A collaborator reported success without the expected data, or a ledger
    /// write touched an unexpected number of rows.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// A downstream call failed or timed out.
    #[error("{service} call failed: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
    },
}

impl SagaError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        SagaError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn external(service: &'static str, message: impl std::fmt::Display) -> Self {
        SagaError::ExternalService {
            service,
            message: message.to_string(),
        }
    }

    /// HTTP status the request surface reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            SagaError::Validation(_) | SagaError::OutOfStock { .. } => 422,
            SagaError::NotFound { .. } => 404,
            SagaError::Integrity(_) | SagaError::ExternalService { .. } => 500,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SagaError::Validation(_) => "validation",
            SagaError::NotFound { .. } => "not_found",
            SagaError::OutOfStock { .. } => "out_of_stock",
            SagaError::Integrity(_) => "integrity",
            SagaError::ExternalService { .. } => "external_service",
        }
    }
}

impl From<DomainError> for SagaError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTrack(v) => ValidationError::InvalidTrack(v).into(),
            DomainError::InvalidSubscriptionType(v) => {
                ValidationError::InvalidSubscriptionType(v).into()
            }
            DomainError::IneligibleCoupon(c) => ValidationError::IneligibleCoupon(c).into(),
            DomainError::PlanCountryMismatch { plan, country } => {
                ValidationError::PlanCountryMismatch { plan, country }.into()
            }
            DomainError::MissingMetadataField(_) | DomainError::MalformedMetadata(_) => {
                SagaError::Integrity(err.to_string())
            }
        }
    }
}

impl From<LedgerError> for SagaError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UnexpectedRowCount { .. } | LedgerError::Corrupt(_) => {
                SagaError::Integrity(err.to_string())
            }
            LedgerError::RowNotFound { cycle, product } => {
                SagaError::not_found("ledger row", format!("{cycle}/{product}"))
            }
            LedgerError::Database(_) | LedgerError::Migration(_) | LedgerError::Unavailable(_) => {
                SagaError::external("ledger", err)
            }
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
