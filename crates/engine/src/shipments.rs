//! Inbound shipment sync.
//!
//! Channel-fulfilled orders ship without the seller touching a parcel;
//! the ERP only learns about it here. For each marketplace-shipped
//! order the matching outgoing delivery is assigned and validated, with
//! a forced-quantity fallback when validation wants operator input.

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use connectors::erp::{model, ErpClient};
use domain::ErpStatus;
use store::OrderStore;

use crate::error::Result;
use crate::outcome::{ItemError, ShipmentOutcome};

/// Reflects marketplace-side shipments onto ERP deliveries.
pub struct ShipmentSync<S, E> {
    store: S,
    erp: E,
}

impl<S, E> ShipmentSync<S, E>
where
    S: OrderStore,
    E: ErpClient,
{
    /// Creates the syncer.
    pub fn new(store: S, erp: E) -> Self {
        Self { store, erp }
    }

    /// Validates ERP deliveries for marketplace-fulfilled shipments.
    #[tracing::instrument(skip(self))]
    pub async fn sync_shipments(&self) -> ShipmentOutcome {
        let mut outcome = ShipmentOutcome::default();
        let pending = match self.store.pending_inbound_shipments().await {
            Ok(pending) => pending,
            Err(err) => {
                outcome
                    .errors
                    .push(ItemError::new("pending_inbound_shipments", err));
                return outcome;
            }
        };

        for mut order in pending {
            outcome.checked += 1;
            let Some(erp_order_id) = order.sync.erp_order_id else {
                continue;
            };
            match self.validate_delivery(erp_order_id).await {
                Ok(DeliveryResult::Validated) => {
                    order.sync.erp_status = ErpStatus::Done;
                    self.attach_invoice(&mut order).await;
                    order.record_sync_ok();
                    if let Err(err) = self.store.save(&order).await {
                        outcome
                            .errors
                            .push(ItemError::new(order.key.to_string(), err));
                        continue;
                    }
                    outcome.synced += 1;
                }
                Ok(DeliveryResult::AlreadyDone) => {
                    // Delivery was done all along; flag it so the next
                    // cycle stops picking this order up.
                    order.sync.erp_status = ErpStatus::Done;
                    self.attach_invoice(&mut order).await;
                    order.record_sync_ok();
                    if let Err(err) = self.store.save(&order).await {
                        outcome
                            .errors
                            .push(ItemError::new(order.key.to_string(), err));
                        continue;
                    }
                    outcome.skipped += 1;
                }
                Ok(DeliveryResult::NoDelivery) => {
                    debug!(key = %order.key, "no pending delivery found");
                    outcome.skipped += 1;
                }
                Err(err) => {
                    outcome
                        .errors
                        .push(ItemError::new(order.key.to_string(), &err));
                    order.record_sync_error(err.to_string());
                    let _ = self.store.save(&order).await;
                }
            }
        }

        info!(
            checked = outcome.checked,
            synced = outcome.synced,
            skipped = outcome.skipped,
            errors = outcome.errors.len(),
            "inbound shipment sync finished"
        );
        outcome
    }

    /// Locates and validates the outgoing delivery of one ERP order.
    async fn validate_delivery(&self, erp_order_id: i64) -> Result<DeliveryResult> {
        let pickings = self
            .erp
            .search_read(
                model::STOCK_PICKING,
                json!([
                    ["sale_id", "=", erp_order_id],
                    ["picking_type_code", "=", "outgoing"],
                    ["state", "not in", ["done", "cancel"]]
                ]),
                &["state"],
                None,
            )
            .await?;

        let Some(picking) = pickings.first() else {
            // Nothing pending: either already done or never created.
            let done = self
                .erp
                .search_read(
                    model::STOCK_PICKING,
                    json!([
                        ["sale_id", "=", erp_order_id],
                        ["picking_type_code", "=", "outgoing"],
                        ["state", "=", "done"]
                    ]),
                    &["state"],
                    Some(1),
                )
                .await?;
            return Ok(if done.is_empty() {
                DeliveryResult::NoDelivery
            } else {
                DeliveryResult::AlreadyDone
            });
        };

        let picking_id = picking
            .get("id")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let state = picking.get("state").and_then(Value::as_str).unwrap_or("");

        // Awaiting availability: force assignment first.
        if state == "confirmed" {
            self.erp
                .execute(model::STOCK_PICKING, "action_assign", &[picking_id])
                .await?;
        }

        match self
            .erp
            .execute(model::STOCK_PICKING, "button_validate", &[picking_id])
            .await
        {
            Ok(_) => Ok(DeliveryResult::Validated),
            Err(err) => {
                // The standard path wants operator confirmation; force
                // every move to the ordered quantity and retry once.
                warn!(picking_id, error = %err, "validation needs confirmation, forcing quantities");
                self.force_move_quantities(picking_id).await?;
                self.erp
                    .execute(model::STOCK_PICKING, "button_validate", &[picking_id])
                    .await?;
                Ok(DeliveryResult::Validated)
            }
        }
    }

    /// Best-effort invoice linkage: once the delivery is done, a posted
    /// invoice referencing the order is recorded on the canonical order.
    async fn attach_invoice(&self, order: &mut domain::CanonicalOrder) {
        if order.sync.erp_invoice_id.is_some() {
            return;
        }
        let Some(name) = order.sync.erp_order_name.clone() else {
            return;
        };
        let result = self
            .erp
            .search_read(
                model::ACCOUNT_MOVE,
                json!([["invoice_origin", "=", name], ["state", "!=", "cancel"]]),
                &["state"],
                Some(1),
            )
            .await;
        match result {
            Ok(rows) => {
                order.sync.erp_invoice_id = rows
                    .first()
                    .and_then(|r| r.get("id"))
                    .and_then(Value::as_i64);
            }
            Err(err) => {
                debug!(key = %order.key, error = %err, "invoice lookup failed, leaving unset");
            }
        }
    }

    async fn force_move_quantities(&self, picking_id: i64) -> Result<()> {
        let moves = self
            .erp
            .search_read(
                model::STOCK_MOVE,
                json!([["picking_id", "=", picking_id]]),
                &["product_uom_qty"],
                None,
            )
            .await?;
        for mv in &moves {
            let (Some(move_id), Some(qty)) = (
                mv.get("id").and_then(Value::as_i64),
                mv.get("product_uom_qty").and_then(Value::as_f64),
            ) else {
                continue;
            };
            self.erp
                .write(
                    model::STOCK_MOVE,
                    &[move_id],
                    json!({"quantity_done": qty}),
                )
                .await?;
        }
        Ok(())
    }
}

enum DeliveryResult {
    Validated,
    AlreadyDone,
    NoDelivery,
}
