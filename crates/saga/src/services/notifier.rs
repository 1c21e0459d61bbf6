//! Real-time notifier trait and in-memory implementation.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, SagaError};

/// A notification as delivered to a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub channel: String,
    pub event: String,
    pub payload: Value,
}

/// Fire-and-forget publisher. No delivery guarantee.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, channel: &str, event: &str, payload: Value) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    published: Vec<Published>,
    fail_on_publish: bool,
}

/// In-memory notifier for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_publish = fail;
    }

    pub fn published(&self) -> Vec<Published> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .published
            .clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn publish(&self, channel: &str, event: &str, payload: Value) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_on_publish {
            return Err(SagaError::external("notifier", "publish rejected"));
        }
        state.published.push(Published {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        });
        Ok(())
    }
}
