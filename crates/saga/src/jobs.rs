//! Background jobs enqueued after a saga commits.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kinds of asynchronous follow-up work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Push subscription state to the analytics warehouse.
    AnalyticsSync,
    /// Mirror a committed ledger delta into storefront stock.
    InventoryAdjustment,
    CancellationSurvey,
    SurveyDeactivation,
    SwapConfirmation,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::AnalyticsSync => "analytics_sync",
            JobKind::InventoryAdjustment => "inventory_adjustment",
            JobKind::CancellationSurvey => "cancellation_survey",
            JobKind::SurveyDeactivation => "survey_deactivation",
            JobKind::SwapConfirmation => "swap_confirmation",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A job as handed to the queue.
///
/// Delivery is at-least-once, so `id` lets consumers drop duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub payload: Value,
    pub priority: Option<u8>,
    pub delay: Option<Duration>,
}

impl QueuedJob {
    pub fn new(kind: JobKind, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            priority: None,
            delay: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}
