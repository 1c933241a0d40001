//! One synchronization cycle.
//!
//! Phases run strictly in sequence — import, create, inbound shipment
//! sync, tracking push, cancellation sync — against the shared
//! canonical-order store. Each phase isolates its own per-item errors,
//! so the summary always covers every phase.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use common::{Channel, CountryCode};
use connectors::erp::ErpClient;
use connectors::{CallThrottle, MarketplaceClient, RetryPolicy};
use domain::SkuResolver;
use store::OrderStore;

use crate::caches::ErpLookupCache;
use crate::cancellations::CanceledOrderSync;
use crate::creator::{CreateOptions, JournalRouting, OrderCreator};
use crate::importer::OrderImporter;
use crate::outcome::{
    CancelOutcome, CreateBatchOutcome, PollOutcome, ShipmentOutcome, TrackingOutcome,
};
use crate::shipments::ShipmentSync;
use crate::tracking::TrackingPusher;

/// Static wiring of one cycle: channel identity, resolution and routing
/// rules, pacing, and creation behavior.
#[derive(Clone)]
pub struct CycleConfig {
    pub channel: Channel,
    pub resolver: Arc<SkuResolver>,
    pub routing: JournalRouting,
    pub ship_from: CountryCode,
    pub throttle: Arc<CallThrottle>,
    pub retry: RetryPolicy,
    pub create_options: CreateOptions,
}

/// Aggregated result of one full cycle, the operator-facing record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub import: PollOutcome,
    pub create: CreateBatchOutcome,
    pub shipments: ShipmentOutcome,
    pub tracking: TrackingOutcome,
    pub cancellations: CancelOutcome,
}

impl CycleSummary {
    /// Total error entries across all phases.
    pub fn error_count(&self) -> usize {
        self.import.errors.len()
            + self.create.errors.len()
            + self.shipments.errors.len()
            + self.tracking.errors.len()
            + self.cancellations.errors.len()
    }
}

/// Runs the five order-sync phases in order.
pub struct SyncCycle<S, M, E> {
    importer: OrderImporter<S, M>,
    creator: OrderCreator<S, E>,
    shipments: ShipmentSync<S, E>,
    tracking: TrackingPusher<S, M, E>,
    cancellations: CanceledOrderSync<S, M, E>,
    cache: Arc<ErpLookupCache>,
    create_options: CreateOptions,
}

impl<S, M, E> SyncCycle<S, M, E>
where
    S: OrderStore + Clone,
    M: MarketplaceClient + Clone,
    E: ErpClient + Clone,
{
    /// Wires the phases over shared store and clients.
    pub fn new(store: S, marketplace: M, erp: E, config: CycleConfig) -> Self {
        let cache = Arc::new(ErpLookupCache::new());
        Self {
            importer: OrderImporter::new(
                store.clone(),
                marketplace.clone(),
                config.channel.clone(),
                config.throttle.clone(),
                config.retry.clone(),
            ),
            creator: OrderCreator::new(
                store.clone(),
                erp.clone(),
                config.resolver.clone(),
                config.routing.clone(),
                config.ship_from.clone(),
                cache.clone(),
            ),
            shipments: ShipmentSync::new(store.clone(), erp.clone()),
            tracking: TrackingPusher::new(
                store.clone(),
                marketplace.clone(),
                erp.clone(),
                config.throttle.clone(),
                config.retry.clone(),
            ),
            cancellations: CanceledOrderSync::new(
                store,
                marketplace,
                erp,
                config.channel,
                config.retry,
            ),
            cache,
            create_options: config.create_options,
        }
    }

    /// Runs one full cycle.
    ///
    /// A phase's item failures are contained in its outcome; every
    /// phase runs regardless of what the previous ones hit.
    #[tracing::instrument(skip(self), fields(since = %since))]
    pub async fn run(&self, since: DateTime<Utc>) -> CycleSummary {
        let started = Instant::now();
        metrics::counter!("sync_cycles_total").increment(1);

        // Lookup caches are cycle-scoped.
        self.cache.reset().await;

        let summary = CycleSummary {
            import: self.importer.poll(since).await,
            create: self.creator.create_pending(self.create_options).await,
            shipments: self.shipments.sync_shipments().await,
            tracking: self.tracking.push_pending_tracking().await,
            cancellations: self.cancellations.sync_canceled_orders().await,
        };

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("sync_cycle_duration_seconds").record(duration);
        info!(
            imported = summary.import.orders_upserted,
            created = summary.create.created,
            shipments_synced = summary.shipments.synced,
            tracking_pushed = summary.tracking.pushed,
            canceled = summary.cancellations.canceled,
            errors = summary.error_count(),
            duration,
            "sync cycle finished"
        );
        summary
    }
}
