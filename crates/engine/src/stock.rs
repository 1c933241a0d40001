//! Stock export to the marketplace.
//!
//! Computes per-SKU sellable quantity (ERP free stock minus the safety
//! buffer) for every seller-fulfilled listing and patches it to the
//! marketplace. Listings come from a periodically refreshed report, not
//! a live call per cycle; unresolved SKUs are deduplicated over 24
//! hours and escalated through the notifier.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use common::MarketplaceId;
use connectors::erp::{model, ErpClient};
use connectors::marketplace::types::ListingDto;
use connectors::{CallThrottle, MarketplaceClient, Notifier, ReportPoller, ReportState, RetryPolicy};
use domain::{SkuResolver, StockSnapshot, SubmissionStatus};
use store::{ExportLog, ExportRunRecord};

use crate::outcome::{StockOptions, StockOutcome};

/// Report type listing every merchant listing.
const LISTINGS_REPORT_TYPE: &str = "GET_MERCHANT_LISTINGS_ALL_DATA";

struct CachedListings {
    listings: Vec<ListingDto>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Cache of the seller's listings, refreshed through the report flow.
///
/// The refresh is a state machine advanced once per export run: stale
/// cache requests a report, later runs poll it and swap the parsed
/// result in when it finishes. Exports keep using the previous listings
/// until then, so a slow report never stalls a run.
pub struct ListingsCache {
    marketplace_ids: Vec<MarketplaceId>,
    ttl: Duration,
    cached: RwLock<CachedListings>,
    poller: Mutex<ReportPoller>,
}

impl ListingsCache {
    /// Creates an empty cache with the given time-to-live.
    pub fn new(marketplace_ids: Vec<MarketplaceId>, ttl: Duration) -> Self {
        Self {
            marketplace_ids: marketplace_ids.clone(),
            ttl,
            cached: RwLock::new(CachedListings {
                listings: Vec::new(),
                refreshed_at: None,
            }),
            poller: Mutex::new(ReportPoller::new(LISTINGS_REPORT_TYPE, marketplace_ids)),
        }
    }

    /// Current listings, possibly stale or empty before first refresh.
    pub async fn current(&self) -> Vec<ListingDto> {
        self.cached.read().await.listings.clone()
    }

    fn is_fresh(&self, refreshed_at: Option<DateTime<Utc>>) -> bool {
        refreshed_at.is_some_and(|at| Utc::now() - at < self.ttl)
    }

    /// Advances the refresh state machine.
    pub async fn advance<M: MarketplaceClient>(&self, client: &M) -> connectors::Result<()> {
        {
            let cached = self.cached.read().await;
            let idle = matches!(*self.poller.lock().await.state(), ReportState::Idle);
            if idle && self.is_fresh(cached.refreshed_at) {
                return Ok(());
            }
        }

        let mut poller = self.poller.lock().await;
        // From Idle the tick requests the report; tick again so an
        // instantly finished report completes in the same run.
        if matches!(poller.state(), ReportState::Idle) {
            poller.tick(client).await?;
        }
        poller.tick(client).await?;

        match poller.state().clone() {
            ReportState::Done { .. } => {
                if let Some(raw) = poller.take_document(client).await? {
                    let listings = client.parse_listings_report(&raw);
                    info!(listings = listings.len(), "listings cache refreshed");
                    let mut cached = self.cached.write().await;
                    cached.listings = listings;
                    cached.refreshed_at = Some(Utc::now());
                }
            }
            ReportState::Fatal | ReportState::Cancelled => {
                warn!("listings report failed, will re-request next run");
                poller.reset();
            }
            _ => {}
        }
        Ok(())
    }

    /// Marketplaces this cache covers.
    pub fn marketplace_ids(&self) -> &[MarketplaceId] {
        &self.marketplace_ids
    }
}

/// Exports sellable quantities to the marketplace.
pub struct StockExportEngine<M, E, N, L> {
    marketplace: M,
    erp: E,
    notifier: N,
    log: L,
    resolver: Arc<SkuResolver>,
    listings: ListingsCache,
    throttle: Arc<CallThrottle>,
    retry: RetryPolicy,
    default_safety_stock: f64,
}

impl<M, E, N, L> StockExportEngine<M, E, N, L>
where
    M: MarketplaceClient,
    E: ErpClient,
    N: Notifier,
    L: ExportLog,
{
    /// Creates the engine.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        marketplace: M,
        erp: E,
        notifier: N,
        log: L,
        resolver: Arc<SkuResolver>,
        listings: ListingsCache,
        throttle: Arc<CallThrottle>,
        retry: RetryPolicy,
        default_safety_stock: f64,
    ) -> Self {
        Self {
            marketplace,
            erp,
            notifier,
            log,
            resolver,
            listings,
            throttle,
            retry,
            default_safety_stock,
        }
    }

    /// Runs one stock export.
    #[tracing::instrument(skip(self))]
    pub async fn sync_stock(&self, options: StockOptions) -> StockOutcome {
        let started_at = Utc::now();
        let mut outcome = StockOutcome::default();

        if let Err(err) = self.listings.advance(&self.marketplace).await {
            warn!(error = %err, "listings refresh failed, exporting with cached listings");
        }
        let listings: Vec<ListingDto> = self
            .listings
            .current()
            .await
            .into_iter()
            .filter(ListingDto::is_seller_fulfilled)
            .collect();

        // Group listings by canonical SKU; one ERP read per SKU even
        // when it is listed on several marketplaces.
        let mut by_canonical: BTreeMap<String, Vec<&ListingDto>> = BTreeMap::new();
        let mut unresolved: Vec<String> = Vec::new();
        let mut seen_unresolved = HashSet::new();
        for listing in &listings {
            outcome.total_skus += 1;
            match self.resolver.resolve(&listing.seller_sku).canonical_sku {
                Some(canonical) => {
                    outcome.resolved += 1;
                    by_canonical.entry(canonical).or_default().push(listing);
                }
                None => {
                    if seen_unresolved.insert(listing.seller_sku.clone()) {
                        unresolved.push(listing.seller_sku.clone());
                    }
                }
            }
        }

        for (canonical, listings) in &by_canonical {
            let snapshot = match self.snapshot_for(canonical, listings).await {
                Some(snapshot) => snapshot,
                None => {
                    // Mapped in the table but absent from the ERP: the
                    // operators need to hear about it the same way.
                    if seen_unresolved.insert(canonical.clone()) {
                        unresolved.push(canonical.clone());
                    }
                    outcome.resolved -= listings.len();
                    continue;
                }
            };

            for listing in listings {
                if options.dry_run {
                    continue;
                }
                self.throttle.wait().await;
                let marketplace_id = MarketplaceId::new(&listing.marketplace_id);
                let quantity = snapshot.sellable_qty.floor() as u32;
                let result = self
                    .retry
                    .run("patch_listing_quantity", || {
                        self.marketplace.patch_listing_quantity(
                            &marketplace_id,
                            &listing.seller_sku,
                            quantity,
                        )
                    })
                    .await;
                match result {
                    Ok(()) => outcome.items_updated += 1,
                    Err(err) => {
                        warn!(sku = %listing.seller_sku, error = %err, "listing patch failed");
                        outcome.items_failed += 1;
                    }
                }
            }
        }

        outcome.unresolved = unresolved.len();
        self.report_unresolved(&unresolved).await;

        outcome.summary = format!(
            "{}{} listings, {} resolved, {} unresolved, {} updated, {} failed",
            if options.dry_run { "dry run: " } else { "" },
            outcome.total_skus,
            outcome.resolved,
            outcome.unresolved,
            outcome.items_updated,
            outcome.items_failed,
        );

        metrics::counter!("stock_submissions_total").increment(outcome.items_updated as u64);
        if let Err(err) = self
            .log
            .record_run(&ExportRunRecord {
                started_at,
                total_skus: outcome.total_skus,
                resolved: outcome.resolved,
                unresolved: outcome.unresolved,
                items_updated: outcome.items_updated,
                items_failed: outcome.items_failed,
                dry_run: options.dry_run,
            })
            .await
        {
            warn!(error = %err, "failed to record stock export run");
        }

        info!(summary = %outcome.summary, "stock export finished");
        outcome
    }

    /// Computes the stock snapshot for one canonical SKU, or `None`
    /// when the ERP has no such product.
    async fn snapshot_for(
        &self,
        canonical: &str,
        listings: &[&ListingDto],
    ) -> Option<StockSnapshot> {
        let rows = self
            .erp
            .search_read(
                model::PRODUCT_PRODUCT,
                json!([["default_code", "=", canonical]]),
                &["free_qty", "x_safety_stock"],
                Some(1),
            )
            .await
            .ok()?;
        let row = rows.first()?;

        let free_qty = row
            .get("free_qty")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .max(0.0);
        let safety_stock = row
            .get("x_safety_stock")
            .and_then(Value::as_f64)
            .unwrap_or(self.default_safety_stock);

        let mut snapshot = StockSnapshot::compute(
            canonical,
            free_qty,
            safety_stock,
            listings
                .iter()
                .map(|l| MarketplaceId::new(&l.marketplace_id))
                .collect(),
        );
        snapshot.status = SubmissionStatus::Pending;
        Some(snapshot)
    }

    /// Escalates fresh unresolved SKUs through the notifier.
    async fn report_unresolved(&self, unresolved: &[String]) {
        if unresolved.is_empty() {
            return;
        }
        let fresh = match self.log.claim_unreported(unresolved).await {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!(error = %err, "unresolved-SKU dedup failed, reporting all");
                unresolved.to_vec()
            }
        };
        if !fresh.is_empty() {
            self.notifier.notify_unresolved_skus(&fresh).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::{CaptureNotifier, InMemoryErp, InMemoryMarketplaceClient};
    use std::collections::HashMap;
    use store::InMemoryExportLog;

    const REPORT: &str = "sku\tmarketplace-id\tfulfillment\n\
                          B42056R4-FBM\tAMEN7PMS3EDWL\tMFN\n\
                          AC401\tAMEN7PMS3EDWL\tMFN\n\
                          FBA-ONLY\tAMEN7PMS3EDWL\tAFN\n";

    struct Fixture {
        marketplace: InMemoryMarketplaceClient,
        erp: InMemoryErp,
        notifier: CaptureNotifier,
        log: InMemoryExportLog,
    }

    impl Fixture {
        async fn new() -> Self {
            let marketplace = InMemoryMarketplaceClient::new();
            marketplace.set_report_document(REPORT).await;
            Self {
                marketplace,
                erp: InMemoryErp::new(),
                notifier: CaptureNotifier::new(),
                log: InMemoryExportLog::new(),
            }
        }

        fn engine(
            &self,
            table: HashMap<String, String>,
        ) -> StockExportEngine<
            InMemoryMarketplaceClient,
            InMemoryErp,
            CaptureNotifier,
            InMemoryExportLog,
        > {
            StockExportEngine::new(
                self.marketplace.clone(),
                self.erp.clone(),
                self.notifier.clone(),
                self.log.clone(),
                Arc::new(SkuResolver::new(table)),
                ListingsCache::new(
                    vec![MarketplaceId::new("AMEN7PMS3EDWL")],
                    Duration::hours(12),
                ),
                Arc::new(CallThrottle::unlimited()),
                RetryPolicy::none(),
                10.0,
            )
        }
    }

    fn catalog_table() -> HashMap<String, String> {
        HashMap::from([
            ("B42056R4".to_string(), "B42056R4".to_string()),
            ("AC401".to_string(), "AC401".to_string()),
        ])
    }

    #[tokio::test]
    async fn computes_and_patches_sellable_quantities() {
        let fixture = Fixture::new().await;
        fixture
            .erp
            .seed(
                model::PRODUCT_PRODUCT,
                json!({"default_code": "B42056R4", "free_qty": 50.0, "x_safety_stock": 10.0}),
            )
            .await;
        fixture
            .erp
            .seed(
                model::PRODUCT_PRODUCT,
                json!({"default_code": "AC401", "free_qty": 5.0, "x_safety_stock": 10.0}),
            )
            .await;

        let engine = fixture.engine(catalog_table());
        let outcome = engine.sync_stock(StockOptions::default()).await;

        // The FBA listing is out of scope; both MFN listings resolve.
        assert_eq!(outcome.total_skus, 2);
        assert_eq!(outcome.resolved, 2);
        assert_eq!(outcome.items_updated, 2);
        assert_eq!(outcome.items_failed, 0);

        let patches = fixture.marketplace.patches().await;
        let by_sku: HashMap<_, _> = patches
            .iter()
            .map(|p| (p.seller_sku.as_str(), p.quantity))
            .collect();
        // 50 free - 10 safety = 40; 5 free - 10 safety floors at 0.
        assert_eq!(by_sku["B42056R4-FBM"], 40);
        assert_eq!(by_sku["AC401"], 0);
    }

    #[tokio::test]
    async fn missing_safety_stock_uses_default() {
        let fixture = Fixture::new().await;
        fixture
            .erp
            .seed(
                model::PRODUCT_PRODUCT,
                json!({"default_code": "B42056R4", "free_qty": 25.0}),
            )
            .await;
        fixture
            .erp
            .seed(
                model::PRODUCT_PRODUCT,
                json!({"default_code": "AC401", "free_qty": 0.0}),
            )
            .await;

        let engine = fixture.engine(catalog_table());
        engine.sync_stock(StockOptions::default()).await;

        let patches = fixture.marketplace.patches().await;
        let b = patches.iter().find(|p| p.seller_sku == "B42056R4-FBM").unwrap();
        assert_eq!(b.quantity, 15, "default safety stock of 10 applies");
    }

    #[tokio::test]
    async fn dry_run_patches_nothing() {
        let fixture = Fixture::new().await;
        fixture
            .erp
            .seed(
                model::PRODUCT_PRODUCT,
                json!({"default_code": "B42056R4", "free_qty": 50.0}),
            )
            .await;
        fixture
            .erp
            .seed(
                model::PRODUCT_PRODUCT,
                json!({"default_code": "AC401", "free_qty": 5.0}),
            )
            .await;

        let engine = fixture.engine(catalog_table());
        let outcome = engine.sync_stock(StockOptions { dry_run: true }).await;

        assert_eq!(outcome.items_updated, 0);
        assert!(fixture.marketplace.patches().await.is_empty());
        assert!(outcome.summary.starts_with("dry run"));
        // The run is still logged.
        assert_eq!(fixture.log.runs().await.len(), 1);
        assert!(fixture.log.runs().await[0].dry_run);
    }

    #[tokio::test]
    async fn unresolved_skus_are_reported_once_per_window() {
        let fixture = Fixture::new().await;
        // Empty override table: nothing resolves.
        let engine = fixture.engine(HashMap::new());

        let outcome = engine.sync_stock(StockOptions::default()).await;
        assert_eq!(outcome.unresolved, 2);
        let reported = fixture.notifier.reported().await;
        assert_eq!(reported.len(), 2);

        // Second run inside the window: no new notifications.
        engine.sync_stock(StockOptions::default()).await;
        assert_eq!(fixture.notifier.reported().await.len(), 2);
    }

    #[tokio::test]
    async fn patch_failures_are_counted_not_fatal() {
        let fixture = Fixture::new().await;
        fixture
            .erp
            .seed(
                model::PRODUCT_PRODUCT,
                json!({"default_code": "B42056R4", "free_qty": 50.0}),
            )
            .await;
        fixture
            .erp
            .seed(
                model::PRODUCT_PRODUCT,
                json!({"default_code": "AC401", "free_qty": 50.0}),
            )
            .await;
        fixture.marketplace.set_fail_on_patch(true).await;

        let engine = fixture.engine(catalog_table());
        let outcome = engine.sync_stock(StockOptions::default()).await;
        assert_eq!(outcome.items_updated, 0);
        assert_eq!(outcome.items_failed, 2);
    }

    #[tokio::test]
    async fn table_mapped_sku_missing_in_erp_is_escalated() {
        let fixture = Fixture::new().await;
        // Table maps both, but only one product exists in the ERP.
        fixture
            .erp
            .seed(
                model::PRODUCT_PRODUCT,
                json!({"default_code": "AC401", "free_qty": 50.0}),
            )
            .await;

        let engine = fixture.engine(catalog_table());
        let outcome = engine.sync_stock(StockOptions::default()).await;
        assert_eq!(outcome.items_updated, 1);
        assert!(fixture
            .notifier
            .reported()
            .await
            .contains(&"B42056R4".to_string()));
    }
}
