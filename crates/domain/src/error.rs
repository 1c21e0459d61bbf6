//! Domain error types.

use thiserror::Error;

/// Errors raised by domain rules.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The value is empty or does not resolve to an active track.
    #[error("Invalid track: {0:?}")]
    InvalidTrack(String),

    /// The subscription type is neither primary nor addon.
    #[error("Invalid subscription type: {0:?}")]
    InvalidSubscriptionType(String),

    /// The coupon code is internal or promotional and cannot be applied here.
    #[error("Coupon {0} is not eligible")]
    IneligibleCoupon(String),

    /// The plan's country suffix does not match the shipping country.
    #[error("Plan {plan} does not match shipping country {country}")]
    PlanCountryMismatch { plan: String, country: String },

    /// Subscription metadata lacks a required field.
    #[error("Subscription metadata is missing {0}")]
    MissingMetadataField(&'static str),

    /// Subscription metadata could not be decoded.
    #[error("Malformed subscription metadata: {0}")]
    MalformedMetadata(#[from] serde_json::Error),
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;
