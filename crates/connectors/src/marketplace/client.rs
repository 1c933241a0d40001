//! Marketplace client trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::MarketplaceId;

use crate::Result;

use super::types::{
    ListingDto, MarketplaceOrderDto, OrderItemDto, OrderPage, ReportStatusDto,
    ShipmentConfirmation,
};

/// Operation-level surface of the marketplace API consumed by the sync
/// engine. One implementation speaks HTTP; the in-memory double backs
/// the engine tests.
#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    /// Lists orders updated after `since`, one cursor page at a time.
    async fn list_orders(
        &self,
        since: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<OrderPage>;

    /// Lists orders canceled after `since` (gap recovery for the
    /// cancellation sync).
    async fn list_canceled_orders(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<MarketplaceOrderDto>>;

    /// Fetches the line items of one order.
    async fn get_order_items(&self, order_id: &str) -> Result<Vec<OrderItemDto>>;

    /// Confirms a shipment with carrier and tracking data.
    async fn confirm_shipment(&self, confirmation: &ShipmentConfirmation) -> Result<()>;

    /// Patches the available quantity of one listing.
    async fn patch_listing_quantity(
        &self,
        marketplace_id: &MarketplaceId,
        seller_sku: &str,
        quantity: u32,
    ) -> Result<()>;

    /// Requests a report; returns the report id.
    async fn create_report(
        &self,
        report_type: &str,
        marketplace_ids: &[MarketplaceId],
    ) -> Result<String>;

    /// Polls a report's processing status.
    async fn report_status(&self, report_id: &str) -> Result<ReportStatusDto>;

    /// Downloads a finished report document as raw text.
    async fn download_report(&self, document_id: &str) -> Result<String>;

    /// Parses a downloaded listings report into listing rows.
    ///
    /// Default implementation handles the tab-separated merchant
    /// listings format (`sku<TAB>marketplace_id<TAB>fulfillment`).
    fn parse_listings_report(&self, raw: &str) -> Vec<ListingDto> {
        raw.lines()
            .skip(1) // header row
            .filter_map(|line| {
                let mut cols = line.split('\t');
                let sku = cols.next()?.trim();
                let marketplace_id = cols.next()?.trim();
                let fulfillment = cols.next()?.trim();
                if sku.is_empty() {
                    return None;
                }
                Some(ListingDto {
                    seller_sku: sku.to_string(),
                    marketplace_id: marketplace_id.to_string(),
                    fulfillment_type: fulfillment.to_string(),
                })
            })
            .collect()
    }
}
