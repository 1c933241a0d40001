//! In-memory marketplace client for engine tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use common::MarketplaceId;

use crate::error::{ConnectorError, Result};

use super::client::MarketplaceClient;
use super::types::{
    MarketplaceOrderDto, OrderItemDto, OrderPage, ReportStatusDto, ShipmentConfirmation,
};

/// A quantity patch captured by the in-memory client.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPatch {
    pub marketplace_id: MarketplaceId,
    pub seller_sku: String,
    pub quantity: u32,
}

struct State {
    orders: Vec<MarketplaceOrderDto>,
    items: HashMap<String, Vec<OrderItemDto>>,
    confirmations: Vec<ShipmentConfirmation>,
    patches: Vec<CapturedPatch>,
    reports: HashMap<String, ReportStatusDto>,
    documents: HashMap<String, String>,
    next_report_id: u32,
    page_size: usize,
    fail_confirm_with: Option<String>,
    fail_on_patch: bool,
    fail_on_items: bool,
    report_polls_until_done: u32,
}

impl Default for State {
    fn default() -> Self {
        Self {
            orders: Vec::new(),
            items: HashMap::new(),
            confirmations: Vec::new(),
            patches: Vec::new(),
            reports: HashMap::new(),
            documents: HashMap::new(),
            next_report_id: 0,
            page_size: 100,
            fail_confirm_with: None,
            fail_on_patch: false,
            fail_on_items: false,
            report_polls_until_done: 0,
        }
    }
}

/// In-memory marketplace client.
///
/// Orders are paged `page_size` at a time through synthetic cursor
/// tokens; failure switches simulate the error families the engine has
/// to survive.
#[derive(Clone, Default)]
pub struct InMemoryMarketplaceClient {
    state: Arc<RwLock<State>>,
}

impl InMemoryMarketplaceClient {
    /// Creates an empty client with a page size of 100.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the synthetic page size for cursor paging tests.
    pub async fn set_page_size(&self, size: usize) {
        self.state.write().await.page_size = size.max(1);
    }

    /// Seeds one order.
    pub async fn push_order(&self, order: MarketplaceOrderDto) {
        self.state.write().await.orders.push(order);
    }

    /// Seeds the items of one order.
    pub async fn set_items(&self, order_id: &str, items: Vec<OrderItemDto>) {
        self.state
            .write()
            .await
            .items
            .insert(order_id.to_string(), items);
    }

    /// Makes `confirm_shipment` fail with the given message.
    pub async fn set_fail_confirm_with(&self, message: impl Into<String>) {
        self.state.write().await.fail_confirm_with = Some(message.into());
    }

    /// Clears the confirm failure.
    pub async fn clear_fail_confirm(&self) {
        self.state.write().await.fail_confirm_with = None;
    }

    /// Makes `patch_listing_quantity` fail with a 500.
    pub async fn set_fail_on_patch(&self, fail: bool) {
        self.state.write().await.fail_on_patch = fail;
    }

    /// Makes `get_order_items` fail with a 500.
    pub async fn set_fail_on_items(&self, fail: bool) {
        self.state.write().await.fail_on_items = fail;
    }

    /// Number of report-status polls before a created report is Done.
    pub async fn set_report_polls_until_done(&self, polls: u32) {
        self.state.write().await.report_polls_until_done = polls;
    }

    /// Seeds the raw content a finished report serves.
    pub async fn set_report_document(&self, content: impl Into<String>) {
        self.state
            .write()
            .await
            .documents
            .insert("DOC-1".to_string(), content.into());
    }

    /// Shipment confirmations received so far.
    pub async fn confirmations(&self) -> Vec<ShipmentConfirmation> {
        self.state.read().await.confirmations.clone()
    }

    /// Listing patches received so far.
    pub async fn patches(&self) -> Vec<CapturedPatch> {
        self.state.read().await.patches.clone()
    }
}

#[async_trait]
impl MarketplaceClient for InMemoryMarketplaceClient {
    async fn list_orders(
        &self,
        since: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<OrderPage> {
        let state = self.state.read().await;
        let matching: Vec<_> = state
            .orders
            .iter()
            .filter(|o| o.purchase_date >= since)
            .cloned()
            .collect();

        let offset: usize = match next_token {
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse().ok())
                .unwrap_or(0),
            None => 0,
        };
        let page: Vec<_> = matching
            .iter()
            .skip(offset)
            .take(state.page_size)
            .cloned()
            .collect();
        let next = if offset + page.len() < matching.len() {
            Some(format!("page-{}", offset + page.len()))
        } else {
            None
        };
        Ok(OrderPage {
            orders: page,
            next_token: next,
        })
    }

    async fn list_canceled_orders(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<MarketplaceOrderDto>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.purchase_date >= since && o.order_status == "Canceled")
            .cloned()
            .collect())
    }

    async fn get_order_items(&self, order_id: &str) -> Result<Vec<OrderItemDto>> {
        let state = self.state.read().await;
        if state.fail_on_items {
            return Err(ConnectorError::Api {
                status: 500,
                message: "item service unavailable".into(),
            });
        }
        Ok(state.items.get(order_id).cloned().unwrap_or_default())
    }

    async fn confirm_shipment(&self, confirmation: &ShipmentConfirmation) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(message) = &state.fail_confirm_with {
            return Err(ConnectorError::Api {
                status: 400,
                message: message.clone(),
            });
        }
        state.confirmations.push(confirmation.clone());
        Ok(())
    }

    async fn patch_listing_quantity(
        &self,
        marketplace_id: &MarketplaceId,
        seller_sku: &str,
        quantity: u32,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_patch {
            return Err(ConnectorError::Api {
                status: 500,
                message: "listings service unavailable".into(),
            });
        }
        state.patches.push(CapturedPatch {
            marketplace_id: marketplace_id.clone(),
            seller_sku: seller_sku.to_string(),
            quantity,
        });
        Ok(())
    }

    async fn create_report(
        &self,
        _report_type: &str,
        _marketplace_ids: &[MarketplaceId],
    ) -> Result<String> {
        let mut state = self.state.write().await;
        state.next_report_id += 1;
        let report_id = format!("REPORT-{}", state.next_report_id);
        let polls = state.report_polls_until_done;
        state.reports.insert(
            report_id.clone(),
            ReportStatusDto {
                report_id: report_id.clone(),
                processing_status: if polls == 0 { "DONE" } else { "IN_QUEUE" }.to_string(),
                report_document_id: if polls == 0 {
                    Some("DOC-1".to_string())
                } else {
                    None
                },
            },
        );
        Ok(report_id)
    }

    async fn report_status(&self, report_id: &str) -> Result<ReportStatusDto> {
        let mut state = self.state.write().await;
        if state.report_polls_until_done > 0 {
            state.report_polls_until_done -= 1;
        }
        let done = state.report_polls_until_done == 0;
        let status = state
            .reports
            .get_mut(report_id)
            .ok_or_else(|| ConnectorError::Api {
                status: 404,
                message: format!("report {report_id} not found"),
            })?;
        if done {
            status.processing_status = "DONE".to_string();
            status.report_document_id = Some("DOC-1".to_string());
        } else {
            status.processing_status = "IN_PROGRESS".to_string();
        }
        Ok(status.clone())
    }

    async fn download_report(&self, document_id: &str) -> Result<String> {
        let state = self.state.read().await;
        state
            .documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| ConnectorError::Api {
                status: 404,
                message: format!("document {document_id} not found"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn dto(id: &str, days_ago: i64) -> MarketplaceOrderDto {
        MarketplaceOrderDto {
            amazon_order_id: id.into(),
            purchase_date: Utc::now() - Duration::days(days_ago),
            order_status: "Unshipped".into(),
            fulfillment_channel: Some("MFN".into()),
            marketplace_id: "AMEN7PMS3EDWL".into(),
            is_business_order: None,
            order_total: None,
            buyer_info: None,
            shipping_address: None,
        }
    }

    #[tokio::test]
    async fn pages_through_orders() {
        let client = InMemoryMarketplaceClient::new();
        client.set_page_size(2).await;
        for i in 0..5 {
            client.push_order(dto(&format!("order-{i}"), 1)).await;
        }

        let since = Utc::now() - Duration::days(7);
        let mut token: Option<String> = None;
        let mut seen = 0;
        loop {
            let page = client.list_orders(since, token.as_deref()).await.unwrap();
            seen += page.orders.len();
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        assert_eq!(seen, 5);
    }

    #[tokio::test]
    async fn since_filter_applies() {
        let client = InMemoryMarketplaceClient::new();
        client.push_order(dto("old", 30)).await;
        client.push_order(dto("new", 1)).await;

        let page = client
            .list_orders(Utc::now() - Duration::days(7), None)
            .await
            .unwrap();
        assert_eq!(page.orders.len(), 1);
        assert_eq!(page.orders[0].amazon_order_id, "new");
    }
}
