//! Demo catalog for local runs.
//!
//! Builds one active cycle around `now` with its swap window open, three
//! tracks and stocked ledger rows, plus the plans and customers the in-memory
//! billing engine and storefront need to run every saga end to end.

use chrono::{DateTime, Duration, Utc};
use common::{CycleId, PlanId, ProductId, VariantId};
use domain::{CycleStatus, Plan, RotationCycle, Track};
use ledger::{InMemoryLedgerStore, LedgerKey, PostgresLedgerStore, ProductLedgerRow, TrackAssignment};
use saga::{InMemoryBillingEngine, InMemoryStorefront};

const TRACKS: [(&str, &str); 3] = [
    ("fiction", "prod-fiction"),
    ("mystery", "prod-mystery"),
    ("sci-fi", "prod-scifi"),
];

/// Ledger contents for one demo cycle.
pub struct DemoCatalog {
    pub cycle: RotationCycle,
    pub tracks: Vec<Track>,
    pub assignments: Vec<TrackAssignment>,
    pub rows: Vec<ProductLedgerRow>,
}

impl DemoCatalog {
    pub fn around(now: DateTime<Utc>) -> Self {
        let cycle_id = CycleId::new(now.format("%Y-%m").to_string());
        let cycle = RotationCycle {
            id: cycle_id.clone(),
            status: CycleStatus::Active,
            starts_at: now - Duration::days(10),
            ends_at: now + Duration::days(20),
            swap_opens_at: now - Duration::days(2),
            swap_closes_at: now + Duration::days(5),
        };

        let mut tracks = Vec::new();
        let mut assignments = Vec::new();
        let mut rows = Vec::new();
        for (track, product) in TRACKS {
            let mut catalog_track = Track::new(track, track);
            if track == "sci-fi" {
                catalog_track = catalog_track.with_aliases(["science fiction"]);
            }
            tracks.push(catalog_track);
            assignments.push(TrackAssignment {
                cycle_id: cycle_id.clone(),
                track: track.to_string(),
                product_id: ProductId::new(product),
                variant_id: Some(VariantId::new(format!("var-{product}"))),
            });
            rows.push(
                ProductLedgerRow::new(LedgerKey::new(cycle_id.clone(), product), 50, 20, 10)
                    .with_variants(
                        Some(VariantId::new(format!("var-{product}"))),
                        Some(VariantId::new(format!("swap-{product}"))),
                    ),
            );
        }

        Self {
            cycle,
            tracks,
            assignments,
            rows,
        }
    }

    pub async fn seed_in_memory(&self, ledger: &InMemoryLedgerStore) {
        ledger.put_cycle(self.cycle.clone()).await;
        for track in &self.tracks {
            ledger.put_track(track.clone()).await;
        }
        for assignment in &self.assignments {
            ledger.assign_track(assignment.clone()).await;
        }
        for row in &self.rows {
            ledger.put_row(row.clone()).await;
        }
    }

    pub async fn seed_postgres(&self, ledger: &PostgresLedgerStore) -> ledger::Result<()> {
        ledger.upsert_cycle(&self.cycle).await?;
        for track in &self.tracks {
            ledger.upsert_track(track).await?;
        }
        for assignment in &self.assignments {
            ledger.assign_track(assignment).await?;
        }
        for row in &self.rows {
            ledger.upsert_row(row).await?;
        }
        Ok(())
    }
}

/// Plans, customers and variants for the in-memory collaborators.
pub fn seed_collaborators(billing: &InMemoryBillingEngine, storefront: &InMemoryStorefront) {
    for (id, period) in [("monthly", 1), ("annual", 12), ("monthly-intl", 1)] {
        billing.put_plan(Plan {
            id: PlanId::new(id),
            period,
        });
    }
    for id in ["addon-monthly", "addon-monthly-intl"] {
        billing.put_addon_plan(Plan {
            id: PlanId::new(id),
            period: 1,
        });
    }
    billing.put_customer("cus-demo", Some("reader@example.com"));
    storefront.put_customer("sf-demo", Some("US"));
    storefront.put_customer("sf-demo-ca", Some("CA"));
    for (_, product) in TRACKS {
        storefront.put_variant(product, format!("var-{product}"));
    }
    storefront.put_variant("prod-bonus", "var-prod-bonus");
}
