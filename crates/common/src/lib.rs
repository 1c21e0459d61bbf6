//! Shared types for the subscription services.
//!
//! Identifiers are opaque strings issued by the billing engine, the storefront
//! or the cycle provisioning job. Wrapping them keeps a product id from being
//! passed where a variant id is expected.

pub mod clock;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use types::{CustomerId, CycleId, PlanId, ProductId, StorefrontCustomerId, SubscriptionId, VariantId};
