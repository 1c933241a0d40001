//! Outbound tracking push.
//!
//! Seller-fulfilled orders ship from the ERP warehouse; once the
//! delivery is validated with a carrier tracking reference, the
//! marketplace gets a shipment confirmation. The push state on the
//! canonical order only moves forward, so a confirmed order is never
//! confirmed twice.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use connectors::marketplace::types::{ConfirmedItem, ShipmentConfirmation};
use connectors::erp::{model, ErpClient};
use connectors::{CallThrottle, ConnectorError, MarketplaceClient, RetryPolicy};
use domain::heuristics::{is_already_shipped_error, marketplace_carrier_code};
use domain::{CanonicalOrder, TrackingPushState};
use store::OrderStore;

use crate::error::Result;
use crate::outcome::{ItemError, TrackingOutcome};

/// Pushes carrier tracking confirmations to the marketplace.
pub struct TrackingPusher<S, M, E> {
    store: S,
    marketplace: M,
    erp: E,
    throttle: Arc<CallThrottle>,
    retry: RetryPolicy,
}

struct ValidatedDelivery {
    tracking_number: String,
    carrier_name: String,
}

impl<S, M, E> TrackingPusher<S, M, E>
where
    S: OrderStore,
    M: MarketplaceClient,
    E: ErpClient,
{
    /// Creates the pusher.
    pub fn new(
        store: S,
        marketplace: M,
        erp: E,
        throttle: Arc<CallThrottle>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            marketplace,
            erp,
            throttle,
            retry,
        }
    }

    /// Pushes tracking for every validated, not-yet-pushed delivery.
    #[tracing::instrument(skip(self))]
    pub async fn push_pending_tracking(&self) -> TrackingOutcome {
        let mut outcome = TrackingOutcome::default();
        let pending = match self.store.pending_tracking_push().await {
            Ok(pending) => pending,
            Err(err) => {
                outcome
                    .errors
                    .push(ItemError::new("pending_tracking_push", err));
                return outcome;
            }
        };

        for mut order in pending {
            outcome.checked += 1;

            // Monotonicity guard, re-checked before every attempt.
            if order.sync.tracking_push.is_pushed() {
                outcome.already_pushed += 1;
                continue;
            }

            let delivery = match self.validated_delivery(&order).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    debug!(key = %order.key, "delivery not validated or no tracking yet");
                    outcome.skipped += 1;
                    continue;
                }
                Err(err) => {
                    outcome
                        .errors
                        .push(ItemError::new(order.key.to_string(), err));
                    continue;
                }
            };

            match self.push_one(&mut order, &delivery).await {
                Ok(PushResult::Pushed) => outcome.pushed += 1,
                Ok(PushResult::AlreadyShipped) => outcome.already_pushed += 1,
                Err(err) => {
                    order.record_sync_error(err.to_string());
                    let _ = self.store.save(&order).await;
                    outcome
                        .errors
                        .push(ItemError::new(order.key.to_string(), err));
                }
            }
        }

        metrics::counter!("tracking_pushed_total").increment(outcome.pushed as u64);
        info!(
            checked = outcome.checked,
            pushed = outcome.pushed,
            already_pushed = outcome.already_pushed,
            skipped = outcome.skipped,
            errors = outcome.errors.len(),
            "tracking push finished"
        );
        outcome
    }

    /// Reads the validated outgoing delivery and its tracking data.
    async fn validated_delivery(&self, order: &CanonicalOrder) -> Result<Option<ValidatedDelivery>> {
        let Some(erp_order_id) = order.sync.erp_order_id else {
            return Ok(None);
        };
        let pickings = self
            .erp
            .search_read(
                model::STOCK_PICKING,
                json!([
                    ["sale_id", "=", erp_order_id],
                    ["picking_type_code", "=", "outgoing"],
                    ["state", "=", "done"]
                ]),
                &["carrier_tracking_ref", "carrier_id"],
                Some(1),
            )
            .await?;
        let Some(picking) = pickings.first() else {
            return Ok(None);
        };

        let tracking_number = match picking.get("carrier_tracking_ref").and_then(Value::as_str) {
            Some(tracking) if !tracking.trim().is_empty() => tracking.trim().to_string(),
            _ => return Ok(None),
        };
        // The carrier relation reads as [id, display_name].
        let carrier_name = picking
            .get("carrier_id")
            .and_then(Value::as_array)
            .and_then(|pair| pair.get(1))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Some(ValidatedDelivery {
            tracking_number,
            carrier_name,
        }))
    }

    async fn push_one(
        &self,
        order: &mut CanonicalOrder,
        delivery: &ValidatedDelivery,
    ) -> Result<PushResult> {
        self.ensure_order_item_ids(order).await?;

        let items: Vec<ConfirmedItem> = order
            .lines
            .iter()
            .filter_map(|line| {
                line.order_item_id.as_ref().map(|id| ConfirmedItem {
                    order_item_id: id.clone(),
                    quantity: line.quantity,
                })
            })
            .collect();

        let confirmation = ShipmentConfirmation {
            amazon_order_id: order.key.order_id.clone(),
            marketplace_id: order.marketplace_id.as_str().to_string(),
            carrier_code: marketplace_carrier_code(&delivery.carrier_name).to_string(),
            tracking_number: delivery.tracking_number.clone(),
            ship_date: Utc::now(),
            items,
        };

        self.throttle.wait().await;
        let push = self
            .retry
            .run("confirm_shipment", || {
                self.marketplace.confirm_shipment(&confirmation)
            })
            .await;

        let state = match push {
            Ok(()) => TrackingPushState::Pushed,
            // The marketplace is the source of truth: an order it
            // already considers shipped is a successful no-op.
            Err(ConnectorError::Api { message, .. }) if is_already_shipped_error(&message) => {
                debug!(key = %order.key, "marketplace reports already shipped, marking pushed");
                TrackingPushState::AlreadyShippedNoop
            }
            Err(err) => return Err(err.into()),
        };

        order.set_tracking_push(state)?;
        order.record_sync_ok();
        self.store.save(order).await?;
        Ok(match state {
            TrackingPushState::Pushed => PushResult::Pushed,
            _ => PushResult::AlreadyShipped,
        })
    }

    /// Fills in missing marketplace order-item ids from the order-items
    /// API and persists them, so later pushes skip the fetch.
    async fn ensure_order_item_ids(&self, order: &mut CanonicalOrder) -> Result<()> {
        if order.lines.iter().all(|l| l.order_item_id.is_some()) {
            return Ok(());
        }
        self.throttle.wait().await;
        let items = self
            .retry
            .run("get_order_items", || {
                self.marketplace.get_order_items(&order.key.order_id)
            })
            .await?;
        for line in &mut order.lines {
            if line.order_item_id.is_none() {
                if let Some(item) = items.iter().find(|i| i.seller_sku == line.sku) {
                    line.order_item_id = item.order_item_id.clone();
                }
            }
        }
        self.store.save(order).await?;
        Ok(())
    }
}

enum PushResult {
    Pushed,
    AlreadyShipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CountryCode, MarketplaceId, OrderKey};
    use connectors::marketplace::types::OrderItemDto;
    use connectors::{InMemoryErp, InMemoryMarketplaceClient};
    use domain::{ErpStatus, FulfillmentMode, MarketplaceStatus, OrderLine};
    use store::InMemoryOrderStore;

    struct Fixture {
        store: InMemoryOrderStore,
        marketplace: InMemoryMarketplaceClient,
        erp: InMemoryErp,
    }

    impl Fixture {
        fn pusher(&self) -> TrackingPusher<InMemoryOrderStore, InMemoryMarketplaceClient, InMemoryErp> {
            TrackingPusher::new(
                self.store.clone(),
                self.marketplace.clone(),
                self.erp.clone(),
                Arc::new(CallThrottle::unlimited()),
                RetryPolicy::none(),
            )
        }
    }

    async fn fixture_with_order(with_item_id: bool) -> (Fixture, OrderKey) {
        let fixture = Fixture {
            store: InMemoryOrderStore::new(),
            marketplace: InMemoryMarketplaceClient::new(),
            erp: InMemoryErp::new(),
        };
        let sale = fixture
            .erp
            .seed(model::SALE_ORDER, json!({"state": "sale"}))
            .await;
        fixture
            .erp
            .seed(
                model::STOCK_PICKING,
                json!({
                    "sale_id": sale,
                    "picking_type_code": "outgoing",
                    "state": "done",
                    "carrier_tracking_ref": "1Z999AA10123456784",
                    "carrier_id": [5, "DHL Express"],
                }),
            )
            .await;

        let mut order = CanonicalOrder::imported(
            OrderKey::amazon("405-7777"),
            MarketplaceId::new("A1PA6795UKMFR9"),
            CountryCode::new("DE"),
            FulfillmentMode::SellerFulfilled,
            Utc::now(),
            MarketplaceStatus::Unshipped,
        );
        let mut line = OrderLine::reconcile("B42056R4", Some(2), None).unwrap();
        if with_item_id {
            line.order_item_id = Some("item-1".into());
        }
        order.attach_lines(vec![line]);
        order
            .attach_erp_order(sale, "FBM405-7777".into(), ErpStatus::Confirmed)
            .unwrap();
        fixture.store.save(&order).await.unwrap();
        (fixture, order.key)
    }

    #[tokio::test]
    async fn pushes_tracking_once() {
        let (fixture, key) = fixture_with_order(true).await;
        let pusher = fixture.pusher();

        let outcome = pusher.push_pending_tracking().await;
        assert_eq!(outcome.pushed, 1, "errors: {:?}", outcome.errors);

        let confirmations = fixture.marketplace.confirmations().await;
        assert_eq!(confirmations.len(), 1);
        assert_eq!(confirmations[0].carrier_code, "DHL");
        assert_eq!(confirmations[0].tracking_number, "1Z999AA10123456784");
        assert_eq!(confirmations[0].items[0].order_item_id, "item-1");

        let order = fixture.store.get(&key).await.unwrap().unwrap();
        assert_eq!(order.sync.tracking_push, TrackingPushState::Pushed);

        // Second run: the order no longer qualifies, nothing is pushed.
        let second = pusher.push_pending_tracking().await;
        assert_eq!(second.checked, 0);
        assert_eq!(fixture.marketplace.confirmations().await.len(), 1);
    }

    #[tokio::test]
    async fn fetches_missing_item_ids_on_demand() {
        let (fixture, key) = fixture_with_order(false).await;
        fixture
            .marketplace
            .set_items(
                "405-7777",
                vec![OrderItemDto {
                    order_item_id: Some("item-9".into()),
                    seller_sku: "B42056R4".into(),
                    ..Default::default()
                }],
            )
            .await;

        let pusher = fixture.pusher();
        let outcome = pusher.push_pending_tracking().await;
        assert_eq!(outcome.pushed, 1, "errors: {:?}", outcome.errors);

        // The fetched id was persisted on the canonical order.
        let order = fixture.store.get(&key).await.unwrap().unwrap();
        assert_eq!(order.lines[0].order_item_id.as_deref(), Some("item-9"));
    }

    #[tokio::test]
    async fn already_shipped_response_is_a_noop_success() {
        let (fixture, key) = fixture_with_order(true).await;
        fixture
            .marketplace
            .set_fail_confirm_with("The package has already been shipped")
            .await;

        let pusher = fixture.pusher();
        let outcome = pusher.push_pending_tracking().await;

        assert_eq!(outcome.pushed, 0);
        assert_eq!(outcome.already_pushed, 1);
        assert!(outcome.errors.is_empty());

        let order = fixture.store.get(&key).await.unwrap().unwrap();
        assert_eq!(
            order.sync.tracking_push,
            TrackingPushState::AlreadyShippedNoop
        );
    }

    #[tokio::test]
    async fn other_confirm_failures_are_errors() {
        let (fixture, key) = fixture_with_order(true).await;
        fixture
            .marketplace
            .set_fail_confirm_with("Invalid tracking number")
            .await;

        let pusher = fixture.pusher();
        let outcome = pusher.push_pending_tracking().await;

        assert_eq!(outcome.pushed, 0);
        assert_eq!(outcome.errors.len(), 1);

        let order = fixture.store.get(&key).await.unwrap().unwrap();
        assert_eq!(order.sync.tracking_push, TrackingPushState::NotPushed);
        assert!(order.sync.last_error.is_some());
    }

    #[tokio::test]
    async fn delivery_without_tracking_is_skipped() {
        let fixture = Fixture {
            store: InMemoryOrderStore::new(),
            marketplace: InMemoryMarketplaceClient::new(),
            erp: InMemoryErp::new(),
        };
        let sale = fixture
            .erp
            .seed(model::SALE_ORDER, json!({"state": "sale"}))
            .await;
        fixture
            .erp
            .seed(
                model::STOCK_PICKING,
                json!({
                    "sale_id": sale,
                    "picking_type_code": "outgoing",
                    "state": "done",
                    "carrier_tracking_ref": false,
                }),
            )
            .await;
        let mut order = CanonicalOrder::imported(
            OrderKey::amazon("405-8888"),
            MarketplaceId::new("A1PA6795UKMFR9"),
            CountryCode::new("DE"),
            FulfillmentMode::SellerFulfilled,
            Utc::now(),
            MarketplaceStatus::Unshipped,
        );
        order.attach_lines(vec![OrderLine::reconcile("B42056R4", Some(1), None).unwrap()]);
        order
            .attach_erp_order(sale, "FBM405-8888".into(), ErpStatus::Confirmed)
            .unwrap();
        fixture.store.save(&order).await.unwrap();

        let outcome = fixture.pusher().push_pending_tracking().await;
        assert_eq!(outcome.skipped, 1);
        assert!(fixture.marketplace.confirmations().await.is_empty());
    }
}
