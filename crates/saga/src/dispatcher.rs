//! Post-commit side-effect dispatch.
//!
//! Sagas stage effects in an [`EffectPlan`] while their transaction is open.
//! The plan can only be turned into [`CommittedEffects`] with a ledger
//! [`CommitReceipt`] (or explicitly, for sagas that never touch the ledger),
//! and the dispatcher accepts nothing else. Nothing can fire before commit.

use std::time::Duration;

use common::StorefrontCustomerId;
use futures_util::future::join_all;
use ledger::{CommitReceipt, LedgerDelta};
use serde::Serialize;
use serde_json::{Value, json};

use crate::deadline;
use crate::jobs::{JobKind, QueuedJob};
use crate::services::{JobQueue, Notifier, Storefront};

/// Priority for storefront stock mirroring.
const INVENTORY_ADJUSTMENT_PRIORITY: u8 = 1;

/// One asynchronous follow-up action.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Job(QueuedJob),
    Publish {
        channel: String,
        event: String,
        payload: Value,
    },
    MembershipTag {
        customer: StorefrontCustomerId,
        tag: String,
    },
    Metafield {
        owner: StorefrontCustomerId,
        key: String,
        value: Value,
    },
}

impl Effect {
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Job(job) => job.kind.as_str(),
            Effect::Publish { .. } => "publish",
            Effect::MembershipTag { .. } => "membership_tag",
            Effect::Metafield { .. } => "metafield",
        }
    }

    fn inventory_adjustment(delta: &LedgerDelta) -> Self {
        Effect::Job(
            QueuedJob::new(
                JobKind::InventoryAdjustment,
                json!({
                    "cycleId": delta.cycle_id,
                    "productId": delta.product_id,
                    "variantId": delta.variant_id,
                    "op": delta.op,
                    "pool": delta.pool,
                    "delta": delta.delta,
                }),
            )
            .with_priority(INVENTORY_ADJUSTMENT_PRIORITY),
        )
    }
}

/// Effects staged during a saga, not yet releasable.
#[derive(Debug, Default)]
pub struct EffectPlan {
    effects: Vec<Effect>,
}

impl EffectPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(&mut self, kind: JobKind, payload: Value) -> &mut Self {
        self.effects.push(Effect::Job(QueuedJob::new(kind, payload)));
        self
    }

    pub fn publish(&mut self, channel: &str, event: &str, payload: Value) -> &mut Self {
        self.effects.push(Effect::Publish {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        });
        self
    }

    pub fn membership_tag(&mut self, customer: StorefrontCustomerId, tag: &str) -> &mut Self {
        self.effects.push(Effect::MembershipTag {
            customer,
            tag: tag.to_string(),
        });
        self
    }

    pub fn metafield(&mut self, owner: StorefrontCustomerId, key: &str, value: Value) -> &mut Self {
        self.effects.push(Effect::Metafield {
            owner,
            key: key.to_string(),
            value,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Releases the plan against a committed ledger transaction, adding one
    /// inventory-adjustment job per applied delta.
    pub fn seal(self, receipt: &CommitReceipt) -> CommittedEffects {
        let mut effects: Vec<Effect> = receipt
            .deltas()
            .iter()
            .map(Effect::inventory_adjustment)
            .collect();
        effects.extend(self.effects);
        CommittedEffects { effects }
    }

    /// Releases the plan for a saga whose only durable step was a billing
    /// engine call.
    pub fn without_ledger(self) -> CommittedEffects {
        CommittedEffects {
            effects: self.effects,
        }
    }
}

/// Effects cleared for dispatch.
#[derive(Debug, Default)]
pub struct CommittedEffects {
    effects: Vec<Effect>,
}

impl CommittedEffects {
    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchFailure {
    pub kind: &'static str,
    pub message: String,
}

/// What happened to each effect handed to the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub dispatched: usize,
    pub failed: Vec<DispatchFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends committed effects to the queue, notifier and storefront.
///
/// Dispatch never fails the request: a failed effect is logged, counted and
/// reported, and must be retried independently.
pub struct SideEffectDispatcher<Q, N, F>
where
    Q: JobQueue,
    N: Notifier,
    F: Storefront,
{
    queue: Q,
    notifier: N,
    storefront: F,
    timeout: Duration,
}

impl<Q, N, F> SideEffectDispatcher<Q, N, F>
where
    Q: JobQueue,
    N: Notifier,
    F: Storefront,
{
    pub fn new(queue: Q, notifier: N, storefront: F, timeout: Duration) -> Self {
        Self {
            queue,
            notifier,
            storefront,
            timeout,
        }
    }

    #[tracing::instrument(skip_all, fields(effects = committed.len()))]
    pub async fn dispatch(&self, committed: CommittedEffects) -> DispatchReport {
        let outcomes = join_all(committed.effects.into_iter().map(|effect| async move {
            let kind = effect.kind();
            (kind, self.send(effect).await)
        }))
        .await;

        let mut report = DispatchReport::default();
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    metrics::counter!("side_effects_dispatched_total", "kind" => kind).increment(1);
                    report.dispatched += 1;
                }
                Err(e) => {
                    metrics::counter!("side_effects_failed_total", "kind" => kind).increment(1);
                    tracing::warn!(kind, error = %e, "side effect dispatch failed");
                    report.failed.push(DispatchFailure {
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        }
        report
    }

    async fn send(&self, effect: Effect) -> crate::error::Result<()> {
        match effect {
            Effect::Job(job) => {
                tracing::debug!(kind = %job.kind, id = %job.id, "enqueueing job");
                deadline::within("queue", self.timeout, self.queue.enqueue(job)).await
            }
            Effect::Publish {
                channel,
                event,
                payload,
            } => {
                deadline::within(
                    "notifier",
                    self.timeout,
                    self.notifier.publish(&channel, &event, payload),
                )
                .await
            }
            Effect::MembershipTag { customer, tag } => {
                deadline::within(
                    "storefront",
                    self.timeout,
                    self.storefront.assign_membership_tag(&customer, &tag),
                )
                .await
            }
            Effect::Metafield { owner, key, value } => {
                deadline::within(
                    "storefront",
                    self.timeout,
                    self.storefront.create_metafield(&owner, &key, value),
                )
                .await
            }
        }
    }
}
