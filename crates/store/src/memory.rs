//! In-memory store implementations for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use common::OrderKey;
use domain::CanonicalOrder;

use crate::orders::{OrderStore, UpsertKind};
use crate::overrides::SkuOverrideSource;
use crate::unresolved::{report_window_cutoff, ExportLog, ExportRunRecord};
use crate::Result;

/// In-memory canonical-order store.
///
/// Same contract as the PostgreSQL implementation; backs the engine
/// tests and local development.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderKey, CanonicalOrder>>>,
}

impl InMemoryOrderStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    async fn filtered(&self, pred: impl Fn(&CanonicalOrder) -> bool) -> Vec<CanonicalOrder> {
        let mut orders: Vec<_> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| pred(o))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.purchase_date);
        orders
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, key: &OrderKey) -> Result<Option<CanonicalOrder>> {
        Ok(self.orders.read().await.get(key).cloned())
    }

    async fn save(&self, order: &CanonicalOrder) -> Result<()> {
        self.orders
            .write()
            .await
            .insert(order.key.clone(), order.clone());
        Ok(())
    }

    async fn upsert_imported(&self, incoming: CanonicalOrder) -> Result<UpsertKind> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&incoming.key) {
            Some(existing) => {
                existing.merge_import(&incoming);
                Ok(UpsertKind::Updated)
            }
            None => {
                orders.insert(incoming.key.clone(), incoming);
                Ok(UpsertKind::Inserted)
            }
        }
    }

    async fn missing_lines(&self, limit: u32) -> Result<Vec<CanonicalOrder>> {
        let mut out = self
            .filtered(|o| !o.lines_fetched && o.status != domain::MarketplaceStatus::Pending)
            .await;
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn eligible_for_creation(&self) -> Result<Vec<CanonicalOrder>> {
        Ok(self.filtered(CanonicalOrder::needs_erp_creation).await)
    }

    async fn pending_inbound_shipments(&self) -> Result<Vec<CanonicalOrder>> {
        Ok(self
            .filtered(CanonicalOrder::needs_inbound_shipment_sync)
            .await)
    }

    async fn pending_tracking_push(&self) -> Result<Vec<CanonicalOrder>> {
        Ok(self.filtered(CanonicalOrder::needs_tracking_push).await)
    }

    async fn pending_cancel_sync(&self) -> Result<Vec<CanonicalOrder>> {
        Ok(self.filtered(CanonicalOrder::needs_cancel_sync).await)
    }
}

/// In-memory SKU override table.
#[derive(Clone, Default)]
pub struct InMemorySkuOverrides {
    table: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemorySkuOverrides {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from `(marketplace_sku, canonical_sku)` pairs.
    pub fn with_entries<I, A, B>(entries: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let table = entries
            .into_iter()
            .map(|(a, b)| (a.into(), b.into()))
            .collect();
        Self {
            table: Arc::new(RwLock::new(table)),
        }
    }

    /// Inserts one mapping.
    pub async fn insert(&self, marketplace_sku: impl Into<String>, canonical: impl Into<String>) {
        self.table
            .write()
            .await
            .insert(marketplace_sku.into(), canonical.into());
    }
}

#[async_trait]
impl SkuOverrideSource for InMemorySkuOverrides {
    async fn load_all(&self) -> Result<HashMap<String, String>> {
        Ok(self.table.read().await.clone())
    }
}

/// In-memory export log with the 24-hour unresolved-SKU dedup window.
#[derive(Clone, Default)]
pub struct InMemoryExportLog {
    runs: Arc<RwLock<Vec<ExportRunRecord>>>,
    reported: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl InMemoryExportLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded runs.
    pub async fn runs(&self) -> Vec<ExportRunRecord> {
        self.runs.read().await.clone()
    }

    /// Backdates a SKU's last report, for window tests.
    pub async fn backdate_report(&self, sku: &str, at: DateTime<Utc>) {
        self.reported.write().await.insert(sku.to_string(), at);
    }
}

#[async_trait]
impl ExportLog for InMemoryExportLog {
    async fn record_run(&self, record: &ExportRunRecord) -> Result<()> {
        self.runs.write().await.push(record.clone());
        Ok(())
    }

    async fn claim_unreported(&self, skus: &[String]) -> Result<Vec<String>> {
        let now = Utc::now();
        let cutoff = report_window_cutoff(now);
        let mut reported = self.reported.write().await;
        let mut fresh = Vec::new();
        for sku in skus {
            match reported.get(sku) {
                Some(at) if *at > cutoff => {}
                _ => {
                    reported.insert(sku.clone(), now);
                    fresh.push(sku.clone());
                }
            }
        }
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{CountryCode, MarketplaceId};
    use domain::{FulfillmentMode, MarketplaceStatus, OrderLine};

    fn order(id: &str, status: MarketplaceStatus) -> CanonicalOrder {
        CanonicalOrder::imported(
            OrderKey::amazon(id),
            MarketplaceId::new("A1PA6795UKMFR9"),
            CountryCode::new("DE"),
            FulfillmentMode::SellerFulfilled,
            Utc::now(),
            status,
        )
    }

    #[tokio::test]
    async fn upsert_inserts_then_merges() {
        let store = InMemoryOrderStore::new();

        let kind = store
            .upsert_imported(order("405-1", MarketplaceStatus::Unshipped))
            .await
            .unwrap();
        assert_eq!(kind, UpsertKind::Inserted);

        // Attach linkage, then re-import a stale snapshot.
        let mut stored = store.get(&OrderKey::amazon("405-1")).await.unwrap().unwrap();
        stored
            .attach_erp_order(11, "FBM405-1".into(), domain::ErpStatus::Draft)
            .unwrap();
        store.save(&stored).await.unwrap();

        let kind = store
            .upsert_imported(order("405-1", MarketplaceStatus::Unshipped))
            .await
            .unwrap();
        assert_eq!(kind, UpsertKind::Updated);

        let after = store.get(&OrderKey::amazon("405-1")).await.unwrap().unwrap();
        assert_eq!(after.sync.erp_order_id, Some(11));
    }

    #[tokio::test]
    async fn missing_lines_excludes_pending_and_fetched() {
        let store = InMemoryOrderStore::new();
        store
            .upsert_imported(order("1", MarketplaceStatus::Unshipped))
            .await
            .unwrap();
        store
            .upsert_imported(order("2", MarketplaceStatus::Pending))
            .await
            .unwrap();

        let mut fetched = order("3", MarketplaceStatus::Unshipped);
        fetched.attach_lines(vec![OrderLine::reconcile("A", Some(1), None).unwrap()]);
        store.save(&fetched).await.unwrap();

        let missing = store.missing_lines(10).await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].key.order_id, "1");
    }

    #[tokio::test]
    async fn claim_unreported_applies_window() {
        let log = InMemoryExportLog::new();
        let skus = vec!["A".to_string(), "B".to_string()];

        let fresh = log.claim_unreported(&skus).await.unwrap();
        assert_eq!(fresh, skus);

        // Immediately again: suppressed by the window.
        let fresh = log.claim_unreported(&skus).await.unwrap();
        assert!(fresh.is_empty());

        // Outside the window: reported again.
        log.backdate_report("A", Utc::now() - Duration::hours(25)).await;
        let fresh = log.claim_unreported(&skus).await.unwrap();
        assert_eq!(fresh, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn export_log_records_runs() {
        let log = InMemoryExportLog::new();
        log.record_run(&ExportRunRecord {
            started_at: Utc::now(),
            total_skus: 10,
            resolved: 8,
            unresolved: 2,
            items_updated: 8,
            items_failed: 0,
            dry_run: false,
        })
        .await
        .unwrap();
        assert_eq!(log.runs().await.len(), 1);
    }
}
