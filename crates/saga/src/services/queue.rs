//! Job queue trait and in-memory implementation.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{Result, SagaError};
use crate::jobs::{JobKind, QueuedJob};

/// At-least-once job queue. No ordering across kinds.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: QueuedJob) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryJobQueueState {
    jobs: Vec<QueuedJob>,
    fail_on_enqueue: bool,
}

/// In-memory job queue for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobQueue {
    state: Arc<RwLock<InMemoryJobQueueState>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_enqueue(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_enqueue = fail;
    }

    pub fn jobs(&self) -> Vec<QueuedJob> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .jobs
            .clone()
    }

    pub fn jobs_of(&self, kind: JobKind) -> Vec<QueuedJob> {
        self.jobs().into_iter().filter(|j| j.kind == kind).collect()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: QueuedJob) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_on_enqueue {
            return Err(SagaError::external("queue", "enqueue rejected"));
        }
        state.jobs.push(job);
        Ok(())
    }
}
