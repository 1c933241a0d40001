//! The canonical order record.
//!
//! One document per marketplace order, shared by every sync phase. The
//! record owns its invariants: ERP linkage is write-once, marketplace
//! status never regresses, tracking-push state only moves forward, and
//! line items carry exactly one quantity field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{CountryCode, MarketplaceId, Money, OrderKey};

use crate::error::OrderError;

use super::status::{ErpStatus, FulfillmentMode, MarketplaceStatus, TrackingPushState};

/// Buyer identity as reported by the marketplace. Any of this may be
/// withheld (PII redaction), so everything is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Buyer {
    pub name: Option<String>,
    pub email: Option<String>,
    /// Company legal name for business orders.
    pub company_name: Option<String>,
    /// VAT number for business orders, first non-empty of the channel's
    /// buyer-vat / business-tax-id / tax-registration fields.
    pub vat_number: Option<String>,
}

/// Shipping address, possibly partially redacted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: Option<String>,
    pub street: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<CountryCode>,
}

/// One ordered line item.
///
/// `quantity` is the single canonical quantity field; the constructor
/// reconciles the two spellings legacy documents and the wire format
/// carry and nothing else ever stores a second one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Marketplace order-item id, required by shipment confirmations.
    /// Absent until the item fetch (or an on-demand fetch) fills it.
    pub order_item_id: Option<String>,
    pub sku: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub tax: Money,
    pub discount: Money,
}

impl OrderLine {
    /// Builds a line from the ingestion boundary, reconciling the two
    /// quantity spellings the channel has used over time.
    ///
    /// Exactly one of the spellings, or both with equal values, is
    /// accepted; disagreeing values are a rejected legacy shape.
    pub fn reconcile(
        sku: impl Into<String>,
        quantity: Option<u32>,
        quantity_ordered: Option<u32>,
    ) -> Result<OrderLine, OrderError> {
        let sku = sku.into();
        let quantity = match (quantity, quantity_ordered) {
            (Some(a), Some(b)) if a == b => a,
            (Some(a), Some(b)) => {
                return Err(OrderError::ConflictingQuantities { sku, a, b });
            }
            (Some(q), None) | (None, Some(q)) => q,
            (None, None) => return Err(OrderError::MissingQuantity { sku }),
        };
        Ok(OrderLine {
            order_item_id: None,
            sku,
            title: String::new(),
            quantity,
            unit_price: Money::zero(),
            tax: Money::zero(),
            discount: Money::zero(),
        })
    }
}

/// Mutable synchronization state attached to the order by the phases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub erp_order_id: Option<i64>,
    pub erp_order_name: Option<String>,
    pub erp_status: ErpStatus,
    pub erp_invoice_id: Option<i64>,
    pub tracking_push: TrackingPushState,
    /// Set once a marketplace cancellation has been reflected in the ERP.
    pub cancel_synced: bool,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// The system's unified, channel-agnostic representation of one
/// marketplace order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOrder {
    pub key: OrderKey,
    pub marketplace_id: MarketplaceId,
    pub country: CountryCode,
    pub fulfillment: FulfillmentMode,
    pub purchase_date: DateTime<Utc>,
    pub status: MarketplaceStatus,
    pub is_business_order: bool,
    pub buyer: Buyer,
    pub ship_to: ShippingAddress,
    pub currency: String,
    pub total: Money,
    /// Empty until the lazy item fetch runs; `lines_fetched` tells the
    /// difference between "no items" and "not fetched yet".
    pub lines: Vec<OrderLine>,
    pub lines_fetched: bool,
    pub sync: SyncState,
    pub imported_at: DateTime<Utc>,
}

impl CanonicalOrder {
    /// Creates a fresh record on first import.
    pub fn imported(
        key: OrderKey,
        marketplace_id: MarketplaceId,
        country: CountryCode,
        fulfillment: FulfillmentMode,
        purchase_date: DateTime<Utc>,
        status: MarketplaceStatus,
    ) -> Self {
        Self {
            key,
            marketplace_id,
            country,
            fulfillment,
            purchase_date,
            status,
            is_business_order: false,
            buyer: Buyer::default(),
            ship_to: ShippingAddress::default(),
            currency: "EUR".to_string(),
            total: Money::zero(),
            lines: Vec::new(),
            lines_fetched: false,
            sync: SyncState::default(),
            imported_at: Utc::now(),
        }
    }

    /// Merges a freshly polled snapshot into this stored record.
    ///
    /// Poll pages can arrive stale and out of order, so the merge only
    /// moves forward: ERP linkage and fetched lines are never touched,
    /// a regressive marketplace status is ignored, and populated buyer
    /// or address data is never replaced with redacted emptiness.
    pub fn merge_import(&mut self, incoming: &CanonicalOrder) {
        debug_assert_eq!(self.key, incoming.key);

        if self.status.can_become(incoming.status) {
            self.status = incoming.status;
        } else {
            tracing::debug!(
                key = %self.key,
                from = %self.status,
                to = %incoming.status,
                "ignoring regressive marketplace status from poll"
            );
        }

        self.fulfillment = incoming.fulfillment;
        self.is_business_order = self.is_business_order || incoming.is_business_order;
        if !incoming.total.is_zero() {
            self.total = incoming.total;
            self.currency = incoming.currency.clone();
        }
        merge_buyer(&mut self.buyer, &incoming.buyer);
        merge_address(&mut self.ship_to, &incoming.ship_to);
        // lines, lines_fetched and sync belong to this record, not the poll.
    }

    /// Attaches the fetched line items. Idempotent on re-fetch.
    pub fn attach_lines(&mut self, lines: Vec<OrderLine>) {
        self.lines = lines;
        self.lines_fetched = true;
    }

    /// Attaches the ERP order created (or found) for this order.
    ///
    /// The linkage is write-once: attaching the same id again is a
    /// no-op, attaching a different one is an invariant violation.
    pub fn attach_erp_order(
        &mut self,
        erp_order_id: i64,
        erp_order_name: String,
        status: ErpStatus,
    ) -> Result<(), OrderError> {
        match self.sync.erp_order_id {
            Some(existing) if existing != erp_order_id => {
                Err(OrderError::ErpOrderAlreadyAttached {
                    existing,
                    attempted: erp_order_id,
                })
            }
            _ => {
                self.sync.erp_order_id = Some(erp_order_id);
                self.sync.erp_order_name = Some(erp_order_name);
                self.sync.erp_status = status;
                Ok(())
            }
        }
    }

    /// Advances the tracking-push state; regressions are rejected.
    pub fn set_tracking_push(&mut self, next: TrackingPushState) -> Result<(), OrderError> {
        if !self.sync.tracking_push.can_become(next) {
            return Err(OrderError::TrackingPushRegression {
                from: self.sync.tracking_push,
                to: next,
            });
        }
        self.sync.tracking_push = next;
        Ok(())
    }

    /// Records an explicit cancellation event from the marketplace.
    pub fn mark_canceled(&mut self) {
        if self.status.can_become(MarketplaceStatus::Canceled) {
            self.status = MarketplaceStatus::Canceled;
        }
    }

    /// Records a sync failure for operator visibility.
    pub fn record_sync_error(&mut self, message: impl Into<String>) {
        self.sync.last_error = Some(message.into());
        self.sync.last_synced_at = Some(Utc::now());
    }

    /// Clears the error slot after a successful sync step.
    pub fn record_sync_ok(&mut self) {
        self.sync.last_error = None;
        self.sync.last_synced_at = Some(Utc::now());
    }

    /// Derived ERP order name, e.g. `FBM405-1234567-1234567`.
    pub fn erp_order_name(&self) -> String {
        format!("{}{}", self.fulfillment.order_name_prefix(), self.key.order_id)
    }

    /// Display name for the ERP contact, in priority order: shipping
    /// name, buyer name, company name, then a synthesized placeholder
    /// from whatever address fragments the redaction left us.
    pub fn customer_display_name(&self) -> String {
        if let Some(name) = non_empty(&self.ship_to.name) {
            return name;
        }
        if let Some(name) = non_empty(&self.buyer.name) {
            return name;
        }
        if let Some(name) = non_empty(&self.buyer.company_name) {
            return name;
        }
        let mut parts = Vec::new();
        if let Some(city) = non_empty(&self.ship_to.city) {
            parts.push(city);
        }
        if let Some(zip) = non_empty(&self.ship_to.postal_code) {
            parts.push(zip);
        }
        if let Some(country) = &self.ship_to.country {
            parts.push(country.as_str().to_string());
        }
        if parts.is_empty() {
            format!("{} customer", self.key.channel)
        } else {
            format!("{} customer ({})", self.key.channel, parts.join(", "))
        }
    }

    /// True once the order qualifies for ERP creation: items fetched,
    /// not canceled, not pending, no ERP order attached yet.
    pub fn needs_erp_creation(&self) -> bool {
        self.lines_fetched
            && !self.lines.is_empty()
            && self.sync.erp_order_id.is_none()
            && !matches!(
                self.status,
                MarketplaceStatus::Pending | MarketplaceStatus::Canceled
            )
    }

    /// True for channel-fulfilled orders whose marketplace shipment has
    /// not yet been reflected on the ERP delivery.
    pub fn needs_inbound_shipment_sync(&self) -> bool {
        self.fulfillment == FulfillmentMode::ChannelFulfilled
            && self.status.is_shipped()
            && self.sync.erp_order_id.is_some()
            && self.sync.erp_status != ErpStatus::Done
            && self.sync.erp_status != ErpStatus::Canceled
    }

    /// True for seller-fulfilled orders with an ERP order and no pushed
    /// tracking confirmation yet.
    pub fn needs_tracking_push(&self) -> bool {
        self.fulfillment == FulfillmentMode::SellerFulfilled
            && self.sync.erp_order_id.is_some()
            && !self.sync.tracking_push.is_pushed()
            && self.status != MarketplaceStatus::Canceled
    }

    /// True for canceled orders whose ERP side still has to catch up.
    pub fn needs_cancel_sync(&self) -> bool {
        self.status == MarketplaceStatus::Canceled
            && !self.sync.cancel_synced
            && self.sync.erp_order_id.is_some()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn merge_buyer(current: &mut Buyer, incoming: &Buyer) {
    merge_field(&mut current.name, &incoming.name);
    merge_field(&mut current.email, &incoming.email);
    merge_field(&mut current.company_name, &incoming.company_name);
    merge_field(&mut current.vat_number, &incoming.vat_number);
}

fn merge_address(current: &mut ShippingAddress, incoming: &ShippingAddress) {
    merge_field(&mut current.name, &incoming.name);
    merge_field(&mut current.street, &incoming.street);
    merge_field(&mut current.street2, &incoming.street2);
    merge_field(&mut current.city, &incoming.city);
    merge_field(&mut current.postal_code, &incoming.postal_code);
    if incoming.country.is_some() {
        current.country = incoming.country.clone();
    }
}

fn merge_field(current: &mut Option<String>, incoming: &Option<String>) {
    if incoming.as_deref().is_some_and(|s| !s.trim().is_empty()) {
        *current = incoming.clone();
    }
}
