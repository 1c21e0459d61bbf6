//! Subscription lifecycle sagas.
//!
//! Each operation coordinates three systems with no shared transaction:
//! the inventory ledger (local, transactional), the billing engine (remote,
//! owns subscription records) and post-commit side effects (queue, notifier,
//! storefront).
//!
//! A saga validates its input, runs ledger statements and billing engine
//! calls inside one ledger transaction, and commits or rolls back. Only a
//! committed transaction can release staged side effects to the dispatcher.

pub mod commands;
pub mod config;
pub mod deadline;
pub mod dispatcher;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod services;

pub use commands::{
    CancelAllSubscriptions, CancelOutcome, CancelSubscription, CreateOutcome, CreateSubscription,
    InvoiceLink, ReactivateOutcome, ReactivateSubscription, SubscriptionOverview, SwapOutcome,
    SwapSubscriptionRecord, SwapWindowView, TermChangeOutcome, TrackChangeOutcome,
    UpdateSubscriptionTerm, UpdateSubscriptionTrack,
};
pub use config::SagaConfig;
pub use dispatcher::{
    CommittedEffects, DispatchFailure, DispatchReport, Effect, EffectPlan, SideEffectDispatcher,
};
pub use error::{Result, SagaError, ValidationError};
pub use jobs::{JobKind, QueuedJob};
pub use orchestrator::SubscriptionOrchestrator;
pub use services::{
    BillingCustomer, BillingEngine, InMemoryBillingEngine, InMemoryJobQueue, InMemoryNotifier,
    InMemoryStorefront, JobQueue, Notifier, Storefront,
};
