use chrono::{DateTime, Utc};
use common::{CustomerId, PlanId, StorefrontCustomerId};
use domain::{
    ProductLink, RotationCycle, SubscriptionMetadata, SubscriptionRecord, SubscriptionStatus,
    SubscriptionType, SwapWindowSnapshot, SwapWindowState,
};
use ledger::{LedgerKey, LedgerStore, LedgerTransaction, LedgerTransactionExt, Pool, TrackAssignment};
use serde_json::json;

use super::{SubscriptionOrchestrator, out_of_stock};
use crate::commands::{CreateOutcome, CreateSubscription};
use crate::dispatcher::EffectPlan;
use crate::error::{Result, SagaError, ValidationError};
use crate::jobs::JobKind;
use crate::services::{BillingEngine, JobQueue, NewSubscription, Notifier, Storefront};

/// Everything a create saga needs once validation has passed.
struct CreatePlan {
    subscription_type: SubscriptionType,
    customer_id: CustomerId,
    storefront_customer_id: StorefrontCustomerId,
    plan_id: PlanId,
    addon_plan_id: Option<PlanId>,
    coupon_ids: Vec<String>,
    cycle: RotationCycle,
    window: SwapWindowState,
    metadata: SubscriptionMetadata,
    key: LedgerKey,
    addons: Vec<TrackAssignment>,
}

impl CreatePlan {
    /// Addons always take a unit; primaries only while the window is open.
    fn reserves_new_sub(&self) -> bool {
        self.subscription_type == SubscriptionType::Addon || self.window.is_open()
    }
}

impl<L, B, F, Q, N> SubscriptionOrchestrator<L, B, F, Q, N>
where
    L: LedgerStore,
    B: BillingEngine,
    F: Storefront,
    Q: JobQueue,
    N: Notifier,
{
    /// Creates a primary or addon subscription, reserving new-subscriber stock
    /// where the start-date rule requires it.
    #[tracing::instrument(skip(self), fields(customer = %cmd.customer_id, kind = %cmd.subscription_type))]
    pub async fn create_subscription(&self, cmd: CreateSubscription) -> Result<CreateOutcome> {
        self.observe("create_subscription", self.run_create(cmd)).await
    }

    async fn run_create(&self, cmd: CreateSubscription) -> Result<CreateOutcome> {
        let plan = self.validate_create(cmd).await?;
        let now = self.clock.now();

        let mut tx = self.store(self.ledger.begin()).await?;
        let staged = self.create_in_tx(&mut tx, &plan, now).await;
        let (subscription, addons, effects) = match staged {
            Ok(created) => created,
            Err(e) => {
                self.rollback(tx, &e).await;
                return Err(e);
            }
        };
        let receipt = self.store(tx.commit()).await.inspect_err(|e| {
            tracing::error!(
                subscription = %subscription.id,
                error = %e,
                "ledger commit failed after billing engine created the subscription"
            );
        })?;

        let dispatch = self.dispatcher.dispatch(effects.seal(&receipt)).await;
        Ok(CreateOutcome {
            subscription,
            addons,
            swap_window: plan.window,
            dispatch,
        })
    }

    /// Input checks and reads. Nothing here opens a transaction.
    async fn validate_create(&self, cmd: CreateSubscription) -> Result<CreatePlan> {
        if cmd.subscription_type.trim().is_empty() {
            return Err(ValidationError::MissingField("subscriptionType").into());
        }
        if cmd.customer_id.is_blank() {
            return Err(ValidationError::MissingField("customerId").into());
        }
        if cmd.storefront_customer_id.is_blank() {
            return Err(ValidationError::MissingField("storefrontCustomerId").into());
        }
        let subscription_type = SubscriptionType::parse(&cmd.subscription_type)?;
        let coupon_ids = self.config.coupons.eligible_coupons(&cmd.coupon_ids)?;

        let resolver = self.track_resolver().await?;
        let track = resolver.canonical(&cmd.track)?;
        let addon_tracks = if subscription_type == SubscriptionType::Primary {
            cmd.addon_tracks
                .iter()
                .map(|t| resolver.canonical(t))
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        let customer = self
            .storefront_call(self.storefront.fetch_customer_by_id(&cmd.storefront_customer_id))
            .await?
            .ok_or_else(|| SagaError::not_found("storefront customer", &cmd.storefront_customer_id))?;
        let country = customer
            .shipping_country()
            .ok_or(ValidationError::MissingField("shippingCountry"))?
            .to_string();

        let existing = self
            .billing_call(self.billing.list_subscriptions(&cmd.customer_id))
            .await?;
        match subscription_type {
            SubscriptionType::Primary => reject_duplicate_primary(&existing)?,
            SubscriptionType::Addon => reject_duplicate_addon(&existing, &track)?,
        }
        for addon_track in &addon_tracks {
            reject_duplicate_addon(&existing, addon_track)?;
        }

        let needs_addon_plan =
            subscription_type == SubscriptionType::Addon || !addon_tracks.is_empty();
        let addon_plan_id = if needs_addon_plan {
            let plans = self.billing_call(self.billing.list_addon_plans()).await?;
            let selected = self
                .config
                .plan_rules
                .select_addon_plan(&plans, &country)
                .cloned()
                .ok_or_else(|| SagaError::not_found("addon plan", &country))?;
            Some(selected)
        } else {
            None
        };

        let plan_id = match subscription_type {
            SubscriptionType::Primary => {
                let plan_id = cmd
                    .plan_id
                    .filter(|p| !p.is_blank())
                    .ok_or(ValidationError::MissingField("planId"))?;
                self.config.plan_rules.check_plan_country(&plan_id, &country)?;
                plan_id
            }
            SubscriptionType::Addon => addon_plan_id
                .clone()
                .ok_or_else(|| SagaError::not_found("addon plan", &country))?,
        };

        let cycle = self
            .active_cycle()
            .await?
            .ok_or_else(|| SagaError::not_found("rotation cycle", "active"))?;
        let window = self.window(Some(&cycle));
        let assignment = self.assignment(&cycle, &track).await?;
        let mut addons = Vec::with_capacity(addon_tracks.len());
        for addon_track in &addon_tracks {
            addons.push(self.assignment(&cycle, addon_track).await?);
        }

        let now = self.clock.now();
        let product_id = cmd
            .product_id
            .filter(|p| !p.is_blank())
            .unwrap_or_else(|| assignment.product_id.clone());
        let swapped = product_id != assignment.product_id;
        let variant_id = cmd.variant_id.or_else(|| {
            if swapped {
                None
            } else {
                assignment.variant_id.clone()
            }
        });

        let metadata = SubscriptionMetadata {
            subscription_type,
            product: ProductLink {
                id: product_id.clone(),
                variant_id,
                track: Some(track),
                swapped,
                swapped_at: swapped.then_some(now),
            },
            swap_window_snapshot: Some(SwapWindowSnapshot::capture(&cycle, now)),
            gift: cmd.gift,
        };

        Ok(CreatePlan {
            subscription_type,
            customer_id: cmd.customer_id,
            storefront_customer_id: cmd.storefront_customer_id,
            plan_id,
            addon_plan_id,
            coupon_ids,
            key: LedgerKey::new(cycle.id.clone(), product_id),
            cycle,
            window,
            metadata,
            addons,
        })
    }

    /// Ledger reservation and probes first, then billing engine calls.
    async fn create_in_tx(
        &self,
        tx: &mut L::Tx,
        plan: &CreatePlan,
        now: DateTime<Utc>,
    ) -> Result<(SubscriptionRecord, Vec<SubscriptionRecord>, EffectPlan)> {
        if plan.reserves_new_sub() {
            // A requested product may have no row this cycle.
            self.probe(tx, &plan.key, Pool::NewSubscriber).await?;
            tracing::debug!(key = %plan.key, "reserving new-subscriber unit");
            if !self.store(tx.reserve_new_sub(&plan.key)).await?.is_reserved() {
                return Err(out_of_stock(&plan.key, Pool::NewSubscriber));
            }
        }

        let addon_keys: Vec<LedgerKey> = plan
            .addons
            .iter()
            .map(|a| LedgerKey::new(plan.cycle.id.clone(), a.product_id.clone()))
            .collect();
        for key in &addon_keys {
            self.probe(tx, key, Pool::NewSubscriber).await?;
        }

        let start_date = self
            .config
            .calendar
            .subscription_start(plan.subscription_type, plan.window, now);
        let subscription = self
            .billing_call(self.billing.create_subscription(
                &plan.customer_id,
                NewSubscription {
                    plan_id: plan.plan_id.clone(),
                    coupon_ids: plan.coupon_ids.clone(),
                    start_date,
                    metadata: plan.metadata.clone(),
                },
            ))
            .await?;

        let mut effects = EffectPlan::new();
        effects.job(
            JobKind::AnalyticsSync,
            json!({
                "subscriptionId": subscription.id,
                "customerId": plan.customer_id,
                "type": plan.subscription_type,
                "track": plan.metadata.track(),
                "productId": plan.metadata.product.id,
            }),
        );
        if plan.subscription_type == SubscriptionType::Primary {
            effects.membership_tag(plan.storefront_customer_id.clone(), &self.config.membership_tag);
        }
        if let Some(gift) = &plan.metadata.gift {
            effects.metafield(
                plan.storefront_customer_id.clone(),
                "gift",
                json!({ "subscriptionId": subscription.id, "gift": gift }),
            );
        }

        let mut addons = Vec::with_capacity(plan.addons.len());
        if let Some(addon_plan_id) = plan.addon_plan_id.as_ref().filter(|_| !plan.addons.is_empty()) {
            let addon_start =
                self.config
                    .calendar
                    .subscription_start(SubscriptionType::Addon, plan.window, now);
            for assignment in &plan.addons {
                let metadata = SubscriptionMetadata {
                    subscription_type: SubscriptionType::Addon,
                    product: ProductLink {
                        id: assignment.product_id.clone(),
                        variant_id: assignment.variant_id.clone(),
                        track: Some(assignment.track.clone()),
                        swapped: false,
                        swapped_at: None,
                    },
                    swap_window_snapshot: plan.metadata.swap_window_snapshot.clone(),
                    gift: None,
                };
                let addon = self
                    .billing_call(self.billing.create_subscription(
                        &plan.customer_id,
                        NewSubscription {
                            plan_id: addon_plan_id.clone(),
                            coupon_ids: Vec::new(),
                            start_date: addon_start,
                            metadata,
                        },
                    ))
                    .await?;
                if plan.window.is_open() {
                    effects.job(
                        JobKind::AnalyticsSync,
                        json!({
                            "subscriptionId": addon.id,
                            "customerId": plan.customer_id,
                            "type": SubscriptionType::Addon,
                            "track": assignment.track,
                            "productId": assignment.product_id,
                        }),
                    );
                }
                addons.push(addon);
            }
        }

        Ok((subscription, addons, effects))
    }
}

fn reject_duplicate_primary(existing: &[SubscriptionRecord]) -> Result<()> {
    match existing
        .iter()
        .find(|s| s.subscription_type == SubscriptionType::Primary && s.status.is_live())
    {
        Some(dup) => Err(ValidationError::DuplicateSubscription(format!(
            "primary subscription {} is {}",
            dup.id,
            dup.status.as_str()
        ))
        .into()),
        None => Ok(()),
    }
}

fn reject_duplicate_addon(existing: &[SubscriptionRecord], track: &str) -> Result<()> {
    match existing.iter().find(|s| {
        s.subscription_type == SubscriptionType::Addon
            && s.status == SubscriptionStatus::Future
            && s.track() == Some(track)
    }) {
        Some(dup) => Err(ValidationError::DuplicateSubscription(format!(
            "addon {} already starts next cycle on track {track}",
            dup.id
        ))
        .into()),
        None => Ok(()),
    }
}
