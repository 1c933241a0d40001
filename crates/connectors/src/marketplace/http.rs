//! HTTP implementation of the marketplace client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use common::MarketplaceId;

use crate::error::{ConnectorError, Result};

use super::client::MarketplaceClient;
use super::types::{
    MarketplaceOrderDto, OrderItemDto, OrderPage, ReportStatusDto, ShipmentConfirmation,
};

/// Configuration of the HTTP marketplace client.
#[derive(Debug, Clone)]
pub struct MarketplaceHttpConfig {
    /// API endpoint, e.g. `https://sellingpartnerapi-eu.amazon.com`.
    pub base_url: String,
    /// Access token for the authorization header.
    pub access_token: String,
    /// Seller id, used by the listings patch path.
    pub seller_id: String,
    /// Per-call HTTP timeout.
    pub timeout: Duration,
}

/// Marketplace client speaking the channel's HTTP API.
///
/// PII-bearing order listings require a restricted data token; it is
/// fetched lazily, cached, and refreshed when the API rejects it.
#[derive(Clone)]
pub struct HttpMarketplaceClient {
    config: MarketplaceHttpConfig,
    client: Client,
    restricted_token: Arc<RwLock<Option<String>>>,
}

/// SP-style response envelope: v0 operations wrap their result.
#[derive(Debug, Deserialize)]
struct Enveloped<T> {
    payload: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrderListPayload {
    #[serde(default)]
    orders: Vec<MarketplaceOrderDto>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrderItemsPayload {
    #[serde(default)]
    order_items: Vec<OrderItemDto>,
}

impl HttpMarketplaceClient {
    /// Builds the client; fails only on TLS/runtime setup.
    pub fn new(config: MarketplaceHttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ConnectorError::Transport)?;
        Ok(Self {
            config,
            client,
            restricted_token: Arc::new(RwLock::new(None)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Maps a non-success response to a connector error.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ConnectorError::RateLimited { retry_after_secs });
        }
        let message = response.text().await.unwrap_or_default();
        Err(ConnectorError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Gets (or fetches) the restricted data token for PII access.
    async fn restricted_token(&self) -> Result<String> {
        if let Some(token) = self.restricted_token.read().await.clone() {
            return Ok(token);
        }
        let response = self
            .client
            .post(self.url("/tokens/2021-03-01/restrictedDataToken"))
            .bearer_auth(&self.config.access_token)
            .json(&json!({
                "restrictedResources": [{
                    "method": "GET",
                    "path": "/orders/v0/orders",
                    "dataElements": ["buyerInfo", "shippingAddress"]
                }]
            }))
            .send()
            .await?;
        let response = Self::check(response).await?;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct TokenResponse {
            restricted_data_token: String,
        }
        let token: TokenResponse = response.json().await?;
        *self.restricted_token.write().await = Some(token.restricted_data_token.clone());
        Ok(token.restricted_data_token)
    }

    /// Drops the cached restricted token after a 401/403.
    async fn invalidate_restricted_token(&self) {
        *self.restricted_token.write().await = None;
    }
}

#[async_trait]
impl MarketplaceClient for HttpMarketplaceClient {
    #[instrument(skip(self), fields(since = %since))]
    async fn list_orders(
        &self,
        since: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<OrderPage> {
        let token = self.restricted_token().await?;
        let mut query: Vec<(&str, String)> = vec![(
            "LastUpdatedAfter",
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
        )];
        if let Some(next) = next_token {
            query.push(("NextToken", next.to_string()));
        }

        let response = self
            .client
            .get(self.url("/orders/v0/orders"))
            .query(&query)
            .header("x-amz-access-token", &token)
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            self.invalidate_restricted_token().await;
        }
        let response = Self::check(response).await?;
        let body: Enveloped<OrderListPayload> = response.json().await?;
        debug!(orders = body.payload.orders.len(), "order page fetched");
        Ok(OrderPage {
            orders: body.payload.orders,
            next_token: body.payload.next_token,
        })
    }

    async fn list_canceled_orders(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<MarketplaceOrderDto>> {
        let response = self
            .client
            .get(self.url("/orders/v0/orders"))
            .query(&[
                (
                    "LastUpdatedAfter",
                    since.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                ("OrderStatuses", "Canceled".to_string()),
            ])
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let body: Enveloped<OrderListPayload> = response.json().await?;
        Ok(body.payload.orders)
    }

    #[instrument(skip(self))]
    async fn get_order_items(&self, order_id: &str) -> Result<Vec<OrderItemDto>> {
        let response = self
            .client
            .get(self.url(&format!("/orders/v0/orders/{order_id}/orderItems")))
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let body: Enveloped<OrderItemsPayload> = response.json().await?;
        Ok(body.payload.order_items)
    }

    #[instrument(skip(self, confirmation), fields(order_id = %confirmation.amazon_order_id))]
    async fn confirm_shipment(&self, confirmation: &ShipmentConfirmation) -> Result<()> {
        let body = json!({
            "marketplaceId": confirmation.marketplace_id,
            "packageDetail": {
                "packageReferenceId": "1",
                "carrierCode": confirmation.carrier_code,
                "trackingNumber": confirmation.tracking_number,
                "shipDate": confirmation.ship_date.to_rfc3339_opts(SecondsFormat::Secs, true),
                "orderItems": confirmation.items.iter().map(|item| json!({
                    "orderItemId": item.order_item_id,
                    "quantity": item.quantity,
                })).collect::<Vec<_>>(),
            }
        });
        let response = self
            .client
            .post(self.url(&format!(
                "/orders/v0/orders/{}/shipmentConfirmation",
                confirmation.amazon_order_id
            )))
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn patch_listing_quantity(
        &self,
        marketplace_id: &MarketplaceId,
        seller_sku: &str,
        quantity: u32,
    ) -> Result<()> {
        let body = json!({
            "productType": "PRODUCT",
            "patches": [{
                "op": "replace",
                "path": "/attributes/fulfillment_availability",
                "value": [{
                    "fulfillment_channel_code": "DEFAULT",
                    "quantity": quantity,
                }]
            }]
        });
        let response = self
            .client
            .patch(self.url(&format!(
                "/listings/2021-08-01/items/{}/{seller_sku}",
                self.config.seller_id
            )))
            .query(&[("marketplaceIds", marketplace_id.as_str())])
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_report(
        &self,
        report_type: &str,
        marketplace_ids: &[MarketplaceId],
    ) -> Result<String> {
        let response = self
            .client
            .post(self.url("/reports/2021-06-30/reports"))
            .bearer_auth(&self.config.access_token)
            .json(&json!({
                "reportType": report_type,
                "marketplaceIds": marketplace_ids.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
            }))
            .send()
            .await?;
        let response = Self::check(response).await?;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct CreateReportResponse {
            report_id: String,
        }
        let body: CreateReportResponse = response.json().await?;
        Ok(body.report_id)
    }

    async fn report_status(&self, report_id: &str) -> Result<ReportStatusDto> {
        let response = self
            .client
            .get(self.url(&format!("/reports/2021-06-30/reports/{report_id}")))
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn download_report(&self, document_id: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(&format!("/reports/2021-06-30/documents/{document_id}")))
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;
        let response = Self::check(response).await?;

        #[derive(Deserialize)]
        struct DocumentResponse {
            url: String,
        }
        let document: DocumentResponse = response.json().await?;

        let content = self.client.get(&document.url).send().await?;
        let content = Self::check(content).await?;
        Ok(content.text().await?)
    }
}
