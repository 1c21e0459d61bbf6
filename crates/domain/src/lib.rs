//! Domain layer for the rotating-catalog subscription service.
//!
//! Everything here is pure: no I/O, no clocks read implicitly. The crate provides:
//! - Rotation cycles and the swap window state machine
//! - Track resolution against the active catalog tracks
//! - Typed subscription records and metadata
//! - Plan, coupon and scheduling rules applied by the orchestrator

pub mod coupon;
pub mod cycle;
pub mod error;
pub mod plan;
pub mod schedule;
pub mod subscription;
pub mod track;

pub use coupon::{CouponPolicy, TermChange};
pub use cycle::{CycleStatus, RotationCycle, SwapWindow, SwapWindowSnapshot, SwapWindowState};
pub use error::DomainError;
pub use plan::{Plan, PlanRules};
pub use schedule::BillingCalendar;
pub use subscription::{
    GiftDetails, ProductLink, SubscriptionMetadata, SubscriptionRecord, SubscriptionStatus,
    SubscriptionType,
};
pub use track::{Track, TrackResolver};
