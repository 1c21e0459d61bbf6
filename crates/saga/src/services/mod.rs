//! External collaborator traits and in-memory implementations.

pub mod billing;
pub mod notifier;
pub mod queue;
pub mod storefront;

pub use billing::{
    BillingCustomer, BillingEngine, InMemoryBillingEngine, Invoice, NewSubscription,
    RenewalEstimate, SubscriptionUpdate, UpdatedSubscription,
};
pub use notifier::{InMemoryNotifier, Notifier, Published};
pub use queue::{InMemoryJobQueue, JobQueue};
pub use storefront::{
    Address, InMemoryStorefront, Storefront, StorefrontCustomer, StorefrontVariant,
};
