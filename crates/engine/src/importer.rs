//! Incremental marketplace order import.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use common::Channel;
use connectors::marketplace::types::OrderItemDto;
use connectors::{CallThrottle, MarketplaceClient, RetryPolicy};
use domain::heuristics::is_pseudo_item;
use domain::OrderLine;
use store::OrderStore;

use crate::outcome::{ItemError, PollOutcome};

/// Hard safety cap on orders consumed in one poll, guarding against
/// unbounded pagination from a misbehaving API.
pub const MAX_ORDERS_PER_POLL: usize = 2_000;

/// Orders whose line items are fetched per poll in the lazy second pass.
const ITEM_FETCH_BATCH: u32 = 200;

/// Polls the marketplace order API and upserts canonical orders.
pub struct OrderImporter<S, M> {
    store: S,
    marketplace: M,
    channel: Channel,
    throttle: Arc<CallThrottle>,
    retry: RetryPolicy,
    in_progress: AtomicBool,
}

impl<S, M> OrderImporter<S, M>
where
    S: OrderStore,
    M: MarketplaceClient,
{
    /// Creates the importer.
    pub fn new(
        store: S,
        marketplace: M,
        channel: Channel,
        throttle: Arc<CallThrottle>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            marketplace,
            channel,
            throttle,
            retry,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Polls orders changed since the watermark.
    ///
    /// An overlapping call returns immediately with `skipped = true`
    /// rather than erroring; the guard makes re-entrant scheduling a
    /// discarded no-op.
    #[tracing::instrument(skip(self), fields(since = %since))]
    pub async fn poll(&self, since: DateTime<Utc>) -> PollOutcome {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("poll already in progress, skipping");
            return PollOutcome::skipped();
        }
        let outcome = self.poll_inner(since).await;
        self.in_progress.store(false, Ordering::Release);

        metrics::counter!("orders_imported_total").increment(outcome.orders_upserted as u64);
        info!(
            found = outcome.orders_found,
            upserted = outcome.orders_upserted,
            items_attached = outcome.items_attached,
            errors = outcome.errors.len(),
            "import poll finished"
        );
        outcome
    }

    async fn poll_inner(&self, since: DateTime<Utc>) -> PollOutcome {
        let mut outcome = PollOutcome::default();

        // First pass: page through the order listing and upsert.
        let mut next_token: Option<String> = None;
        loop {
            self.throttle.wait().await;
            let page = match self
                .retry
                .run("list_orders", || {
                    self.marketplace.list_orders(since, next_token.as_deref())
                })
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    outcome.errors.push(ItemError::new("list_orders", err));
                    return outcome;
                }
            };

            for dto in &page.orders {
                outcome.orders_found += 1;
                let canonical = dto.to_canonical(self.channel.clone());
                match self.store.upsert_imported(canonical).await {
                    Ok(_) => outcome.orders_upserted += 1,
                    Err(err) => outcome
                        .errors
                        .push(ItemError::new(&dto.amazon_order_id, err)),
                }
            }

            if outcome.orders_found >= MAX_ORDERS_PER_POLL {
                warn!(
                    cap = MAX_ORDERS_PER_POLL,
                    "order poll hit the safety cap, stopping pagination"
                );
                break;
            }
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        // Second pass: lazily fetch line items for orders missing them.
        let pending = match self.store.missing_lines(ITEM_FETCH_BATCH).await {
            Ok(pending) => pending,
            Err(err) => {
                outcome.errors.push(ItemError::new("missing_lines", err));
                return outcome;
            }
        };
        for mut order in pending {
            self.throttle.wait().await;
            let items = match self
                .retry
                .run("get_order_items", || {
                    self.marketplace.get_order_items(&order.key.order_id)
                })
                .await
            {
                Ok(items) => items,
                Err(err) => {
                    outcome
                        .errors
                        .push(ItemError::new(order.key.to_string(), err));
                    continue;
                }
            };

            let mut lines = Vec::new();
            for item in &items {
                match normalize_item(item) {
                    Ok(Some(line)) => lines.push(line),
                    Ok(None) => {}
                    Err(message) => outcome
                        .errors
                        .push(ItemError::new(order.key.to_string(), message)),
                }
            }
            order.attach_lines(lines);
            match self.store.save(&order).await {
                Ok(()) => outcome.items_attached += 1,
                Err(err) => outcome
                    .errors
                    .push(ItemError::new(order.key.to_string(), err)),
            }
        }

        outcome
    }
}

/// Normalizes one wire item; `None` filters it out (zero quantity or a
/// promotion pseudo-item).
fn normalize_item(item: &OrderItemDto) -> Result<Option<OrderLine>, String> {
    let line = item.to_line().map_err(|e| e.to_string())?;
    if line.quantity == 0 {
        return Ok(None);
    }
    if is_pseudo_item(&line.sku, line.unit_price) {
        return Ok(None);
    }
    Ok(Some(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::OrderKey;
    use connectors::marketplace::types::{MarketplaceOrderDto, MoneyDto};
    use connectors::InMemoryMarketplaceClient;
    use store::InMemoryOrderStore;

    fn importer(
        store: InMemoryOrderStore,
        marketplace: InMemoryMarketplaceClient,
    ) -> OrderImporter<InMemoryOrderStore, InMemoryMarketplaceClient> {
        OrderImporter::new(
            store,
            marketplace,
            Channel::amazon(),
            Arc::new(CallThrottle::unlimited()),
            RetryPolicy::none(),
        )
    }

    fn dto(id: &str, status: &str) -> MarketplaceOrderDto {
        MarketplaceOrderDto {
            amazon_order_id: id.into(),
            purchase_date: Utc::now() - Duration::hours(1),
            order_status: status.into(),
            fulfillment_channel: Some("MFN".into()),
            marketplace_id: "AMEN7PMS3EDWL".into(),
            is_business_order: None,
            order_total: None,
            buyer_info: None,
            shipping_address: None,
        }
    }

    fn item(sku: &str, qty: u32, price: &str) -> OrderItemDto {
        OrderItemDto {
            order_item_id: Some(format!("item-{sku}")),
            seller_sku: sku.into(),
            title: Some("Test product".into()),
            quantity_ordered: Some(qty),
            quantity: None,
            item_price: Some(MoneyDto {
                currency_code: "EUR".into(),
                amount: price.into(),
            }),
            item_tax: None,
            promotion_discount: None,
        }
    }

    #[tokio::test]
    async fn imports_and_attaches_items() {
        let store = InMemoryOrderStore::new();
        let marketplace = InMemoryMarketplaceClient::new();
        marketplace.push_order(dto("405-1", "Unshipped")).await;
        marketplace
            .set_items("405-1", vec![item("B42056R4-FBM", 2, "24.99")])
            .await;

        let importer = importer(store.clone(), marketplace);
        let outcome = importer.poll(Utc::now() - Duration::days(1)).await;

        assert!(!outcome.skipped);
        assert_eq!(outcome.orders_found, 1);
        assert_eq!(outcome.orders_upserted, 1);
        assert_eq!(outcome.items_attached, 1);
        assert!(outcome.errors.is_empty());

        let order = store.get(&OrderKey::amazon("405-1")).await.unwrap().unwrap();
        assert!(order.lines_fetched);
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.lines[0].quantity, 2);
    }

    #[tokio::test]
    async fn filters_zero_quantity_and_pseudo_items() {
        let store = InMemoryOrderStore::new();
        let marketplace = InMemoryMarketplaceClient::new();
        marketplace.push_order(dto("405-2", "Unshipped")).await;
        marketplace
            .set_items(
                "405-2",
                vec![
                    item("B42056R4", 1, "9.99"),
                    item("CANCELED1", 0, "9.99"),
                    item("PROMO5", 1, "0.00"),
                ],
            )
            .await;

        let importer = importer(store.clone(), marketplace);
        importer.poll(Utc::now() - Duration::days(1)).await;

        let order = store.get(&OrderKey::amazon("405-2")).await.unwrap().unwrap();
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.lines[0].sku, "B42056R4");
    }

    #[tokio::test]
    async fn re_poll_preserves_existing_linkage() {
        let store = InMemoryOrderStore::new();
        let marketplace = InMemoryMarketplaceClient::new();
        marketplace.push_order(dto("405-3", "Unshipped")).await;
        marketplace
            .set_items("405-3", vec![item("B42056R4", 1, "9.99")])
            .await;

        let importer = importer(store.clone(), marketplace);
        importer.poll(Utc::now() - Duration::days(1)).await;

        // Attach ERP linkage out of band.
        let key = OrderKey::amazon("405-3");
        let mut order = store.get(&key).await.unwrap().unwrap();
        order
            .attach_erp_order(77, "FBM405-3".into(), domain::ErpStatus::Draft)
            .unwrap();
        store.save(&order).await.unwrap();

        // A second poll must not disturb it.
        importer.poll(Utc::now() - Duration::days(1)).await;
        let order = store.get(&key).await.unwrap().unwrap();
        assert_eq!(order.sync.erp_order_id, Some(77));
        assert!(order.lines_fetched);
    }

    #[tokio::test]
    async fn pages_through_cursor_tokens() {
        let store = InMemoryOrderStore::new();
        let marketplace = InMemoryMarketplaceClient::new();
        marketplace.set_page_size(2).await;
        for i in 0..5 {
            marketplace
                .push_order(dto(&format!("order-{i}"), "Unshipped"))
                .await;
        }

        let importer = importer(store.clone(), marketplace);
        let outcome = importer.poll(Utc::now() - Duration::days(1)).await;
        assert_eq!(outcome.orders_found, 5);
        assert_eq!(store.order_count().await, 5);
    }

    #[tokio::test]
    async fn item_fetch_failure_is_isolated() {
        let store = InMemoryOrderStore::new();
        let marketplace = InMemoryMarketplaceClient::new();
        marketplace.push_order(dto("405-4", "Unshipped")).await;
        marketplace.set_fail_on_items(true).await;

        let importer = importer(store.clone(), marketplace);
        let outcome = importer.poll(Utc::now() - Duration::days(1)).await;

        // Order still upserted; the item failure is one error entry.
        assert_eq!(outcome.orders_upserted, 1);
        assert_eq!(outcome.errors.len(), 1);
        let order = store.get(&OrderKey::amazon("405-4")).await.unwrap().unwrap();
        assert!(!order.lines_fetched);
    }
}
