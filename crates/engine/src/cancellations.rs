//! Cancellation reconciliation.
//!
//! Marketplace cancellations reach the ERP two ways: canonical orders
//! already flagged canceled by the import, and a direct poll for
//! recently canceled orders that covers poll gaps. The ERP order is
//! only canceled while it still can be; deliveries go first, then the
//! order.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, info};

use common::Channel;
use connectors::erp::{model, ErpClient};
use connectors::{MarketplaceClient, RetryPolicy};
use domain::{CanonicalOrder, ErpStatus};
use store::OrderStore;

use crate::error::Result;
use crate::outcome::{CancelOutcome, ItemError};

/// Days the direct cancellation poll looks back, bounding gap recovery.
const CANCELLATION_LOOKBACK_DAYS: i64 = 7;

/// Reconciles marketplace cancellations into the ERP.
pub struct CanceledOrderSync<S, M, E> {
    store: S,
    marketplace: M,
    erp: E,
    channel: Channel,
    retry: RetryPolicy,
}

impl<S, M, E> CanceledOrderSync<S, M, E>
where
    S: OrderStore,
    M: MarketplaceClient,
    E: ErpClient,
{
    /// Creates the syncer.
    pub fn new(store: S, marketplace: M, erp: E, channel: Channel, retry: RetryPolicy) -> Self {
        Self {
            store,
            marketplace,
            erp,
            channel,
            retry,
        }
    }

    /// Runs both cancellation triggers.
    #[tracing::instrument(skip(self))]
    pub async fn sync_canceled_orders(&self) -> CancelOutcome {
        let mut outcome = CancelOutcome::default();

        // Trigger (b) first: pull recent marketplace cancellations into
        // the canonical store so trigger (a) sees them too.
        let since = Utc::now() - Duration::days(CANCELLATION_LOOKBACK_DAYS);
        if let Err(err) = self.absorb_marketplace_cancellations(since).await {
            outcome
                .errors
                .push(ItemError::new("list_canceled_orders", err));
        }

        // Trigger (a): canonical orders flagged canceled, ERP not yet
        // caught up.
        let pending = match self.store.pending_cancel_sync().await {
            Ok(pending) => pending,
            Err(err) => {
                outcome
                    .errors
                    .push(ItemError::new("pending_cancel_sync", err));
                return outcome;
            }
        };

        for mut order in pending {
            outcome.checked += 1;
            let Some(erp_order_id) = order.sync.erp_order_id else {
                continue;
            };
            match self.cancel_erp_order(erp_order_id).await {
                Ok(CancelResult::Canceled) => {
                    order.sync.erp_status = ErpStatus::Canceled;
                    order.sync.cancel_synced = true;
                    order.record_sync_ok();
                    if let Err(err) = self.store.save(&order).await {
                        outcome
                            .errors
                            .push(ItemError::new(order.key.to_string(), err));
                        continue;
                    }
                    outcome.canceled += 1;
                }
                Ok(CancelResult::AlreadyCanceled) => {
                    order.sync.erp_status = ErpStatus::Canceled;
                    order.sync.cancel_synced = true;
                    order.record_sync_ok();
                    if let Err(err) = self.store.save(&order).await {
                        outcome
                            .errors
                            .push(ItemError::new(order.key.to_string(), err));
                        continue;
                    }
                    outcome.skipped += 1;
                }
                Ok(CancelResult::NotCancellable) => {
                    // Done orders stay done; flag the sync so the order
                    // stops reappearing, the conflict is in the logs.
                    debug!(key = %order.key, "ERP order not cancellable, leaving as is");
                    order.sync.cancel_synced = true;
                    order.record_sync_error("ERP order done, cancellation not applied");
                    let _ = self.store.save(&order).await;
                    outcome.skipped += 1;
                }
                Err(err) => {
                    order.record_sync_error(err.to_string());
                    let _ = self.store.save(&order).await;
                    outcome
                        .errors
                        .push(ItemError::new(order.key.to_string(), err));
                }
            }
        }

        info!(
            checked = outcome.checked,
            canceled = outcome.canceled,
            skipped = outcome.skipped,
            errors = outcome.errors.len(),
            "cancellation sync finished"
        );
        outcome
    }

    /// Pulls recently canceled marketplace orders into the store.
    async fn absorb_marketplace_cancellations(&self, since: DateTime<Utc>) -> Result<()> {
        let canceled = self
            .retry
            .run("list_canceled_orders", || {
                self.marketplace.list_canceled_orders(since)
            })
            .await?;
        for dto in &canceled {
            let incoming = dto.to_canonical(self.channel.clone());
            match self.store.get(&incoming.key).await? {
                Some(mut existing) => {
                    if existing.status != domain::MarketplaceStatus::Canceled {
                        existing.mark_canceled();
                        self.store.save(&existing).await?;
                    }
                }
                None => {
                    // Never imported (poll gap): record it now.
                    self.store.upsert_imported(incoming).await?;
                }
            }
        }
        Ok(())
    }

    /// Cancels one ERP order if it is still cancellable.
    ///
    /// Deliveries are canceled before the order. A `done` order gets no
    /// state-mutating call at all.
    pub async fn cancel_erp_order(&self, erp_order_id: i64) -> Result<CancelResult> {
        let rows = self
            .erp
            .search_read(
                model::SALE_ORDER,
                json!([["id", "=", erp_order_id]]),
                &["state"],
                Some(1),
            )
            .await?;
        let state = rows
            .first()
            .and_then(|r| r.get("state"))
            .and_then(Value::as_str)
            .unwrap_or("");

        match state {
            "cancel" => return Ok(CancelResult::AlreadyCanceled),
            "draft" | "sent" | "sale" => {}
            _ => return Ok(CancelResult::NotCancellable),
        }

        // Linked outgoing deliveries first.
        let pickings = self
            .erp
            .search_read(
                model::STOCK_PICKING,
                json!([
                    ["sale_id", "=", erp_order_id],
                    ["state", "not in", ["done", "cancel"]]
                ]),
                &["state"],
                None,
            )
            .await?;
        let picking_ids: Vec<i64> = pickings
            .iter()
            .filter_map(|p| p.get("id").and_then(Value::as_i64))
            .collect();
        if !picking_ids.is_empty() {
            self.erp
                .execute(model::STOCK_PICKING, "action_cancel", &picking_ids)
                .await?;
        }

        self.erp
            .execute(model::SALE_ORDER, "action_cancel", &[erp_order_id])
            .await?;
        metrics::counter!("erp_orders_canceled_total").increment(1);
        Ok(CancelResult::Canceled)
    }
}

/// Result of one ERP cancellation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelResult {
    Canceled,
    AlreadyCanceled,
    /// The order is in a terminal state (done) and stays untouched.
    NotCancellable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CountryCode, MarketplaceId, OrderKey};
    use connectors::marketplace::types::MarketplaceOrderDto;
    use connectors::{InMemoryErp, InMemoryMarketplaceClient};
    use domain::{FulfillmentMode, MarketplaceStatus};
    use store::InMemoryOrderStore;

    fn sync(
        store: InMemoryOrderStore,
        marketplace: InMemoryMarketplaceClient,
        erp: InMemoryErp,
    ) -> CanceledOrderSync<InMemoryOrderStore, InMemoryMarketplaceClient, InMemoryErp> {
        CanceledOrderSync::new(store, marketplace, erp, Channel::amazon(), RetryPolicy::none())
    }

    async fn seed_canceled_order(
        store: &InMemoryOrderStore,
        id: &str,
        erp_order_id: i64,
    ) -> OrderKey {
        let mut order = CanonicalOrder::imported(
            OrderKey::amazon(id),
            MarketplaceId::new("A1PA6795UKMFR9"),
            CountryCode::new("DE"),
            FulfillmentMode::SellerFulfilled,
            Utc::now(),
            MarketplaceStatus::Unshipped,
        );
        order
            .attach_erp_order(erp_order_id, format!("FBM{id}"), ErpStatus::Confirmed)
            .unwrap();
        order.mark_canceled();
        store.save(&order).await.unwrap();
        order.key
    }

    #[tokio::test]
    async fn cancels_order_and_deliveries() {
        let store = InMemoryOrderStore::new();
        let marketplace = InMemoryMarketplaceClient::new();
        let erp = InMemoryErp::new();
        let sale = erp.seed(model::SALE_ORDER, json!({"state": "sale"})).await;
        let picking = erp
            .seed(
                model::STOCK_PICKING,
                json!({"sale_id": sale, "state": "confirmed"}),
            )
            .await;
        let key = seed_canceled_order(&store, "405-c1", sale).await;

        let outcome = sync(store.clone(), marketplace, erp.clone())
            .sync_canceled_orders()
            .await;

        assert_eq!(outcome.canceled, 1, "errors: {:?}", outcome.errors);
        assert_eq!(
            erp.record(model::SALE_ORDER, sale).await.unwrap().get("state"),
            Some(&json!("cancel"))
        );
        assert_eq!(
            erp.record(model::STOCK_PICKING, picking).await.unwrap().get("state"),
            Some(&json!("cancel"))
        );
        let order = store.get(&key).await.unwrap().unwrap();
        assert!(order.sync.cancel_synced);
        assert_eq!(order.sync.erp_status, ErpStatus::Canceled);
    }

    #[tokio::test]
    async fn done_order_gets_no_mutating_call() {
        let store = InMemoryOrderStore::new();
        let marketplace = InMemoryMarketplaceClient::new();
        let erp = InMemoryErp::new();
        let sale = erp.seed(model::SALE_ORDER, json!({"state": "done"})).await;
        seed_canceled_order(&store, "405-c2", sale).await;

        let syncer = sync(store.clone(), marketplace, erp.clone());
        let result = syncer.cancel_erp_order(sale).await.unwrap();
        assert_eq!(result, CancelResult::NotCancellable);
        assert_eq!(
            erp.record(model::SALE_ORDER, sale).await.unwrap().get("state"),
            Some(&json!("done"))
        );

        let outcome = syncer.sync_canceled_orders().await;
        assert_eq!(outcome.canceled, 0);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn already_canceled_is_marked_synced_without_call() {
        let store = InMemoryOrderStore::new();
        let marketplace = InMemoryMarketplaceClient::new();
        let erp = InMemoryErp::new();
        let sale = erp.seed(model::SALE_ORDER, json!({"state": "cancel"})).await;
        let key = seed_canceled_order(&store, "405-c3", sale).await;

        let outcome = sync(store.clone(), marketplace, erp.clone())
            .sync_canceled_orders()
            .await;
        assert_eq!(outcome.canceled, 0);
        assert_eq!(outcome.skipped, 1);
        let order = store.get(&key).await.unwrap().unwrap();
        assert!(order.sync.cancel_synced);
    }

    #[tokio::test]
    async fn direct_poll_absorbs_missed_cancellations() {
        let store = InMemoryOrderStore::new();
        let marketplace = InMemoryMarketplaceClient::new();
        let erp = InMemoryErp::new();

        // The store has the order as Unshipped with ERP linkage; the
        // marketplace canceled it while polling was down.
        let sale = erp.seed(model::SALE_ORDER, json!({"state": "sale"})).await;
        let mut order = CanonicalOrder::imported(
            OrderKey::amazon("405-c4"),
            MarketplaceId::new("A1PA6795UKMFR9"),
            CountryCode::new("DE"),
            FulfillmentMode::SellerFulfilled,
            Utc::now(),
            MarketplaceStatus::Unshipped,
        );
        order
            .attach_erp_order(sale, "FBM405-c4".into(), ErpStatus::Confirmed)
            .unwrap();
        store.save(&order).await.unwrap();

        marketplace
            .push_order(MarketplaceOrderDto {
                amazon_order_id: "405-c4".into(),
                purchase_date: Utc::now() - chrono::Duration::days(1),
                order_status: "Canceled".into(),
                fulfillment_channel: Some("MFN".into()),
                marketplace_id: "A1PA6795UKMFR9".into(),
                is_business_order: None,
                order_total: None,
                buyer_info: None,
                shipping_address: None,
            })
            .await;

        let outcome = sync(store.clone(), marketplace, erp.clone())
            .sync_canceled_orders()
            .await;

        assert_eq!(outcome.canceled, 1, "errors: {:?}", outcome.errors);
        let order = store.get(&order.key).await.unwrap().unwrap();
        assert_eq!(order.status, MarketplaceStatus::Canceled);
        assert!(order.sync.cancel_synced);
    }
}
