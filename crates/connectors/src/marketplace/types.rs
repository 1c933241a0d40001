//! Wire types of the marketplace API and their normalization into the
//! canonical order shape.
//!
//! The JSON uses the channel's PascalCase field names; normalization
//! into [`CanonicalOrder`] happens here, at the ingestion boundary, so
//! nothing downstream ever sees the wire shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{Channel, CountryCode, MarketplaceId, Money, OrderKey};
use domain::{
    Buyer, CanonicalOrder, FulfillmentMode, MarketplaceStatus, OrderError, OrderLine,
    ShippingAddress,
};

/// Marketplace id → storefront country, for deployments where the
/// shipping address is withheld and the storefront is the only
/// destination signal available at import time.
const MARKETPLACE_COUNTRIES: &[(&str, &str)] = &[
    ("A1PA6795UKMFR9", "DE"),
    ("A13V1IB3VIYZZH", "FR"),
    ("AMEN7PMS3EDWL", "BE"),
    ("A1805IZSGTT6HS", "NL"),
    ("A1RKKUPIHCS9HS", "ES"),
    ("APJ6JRA9NG5V4", "IT"),
    ("A2NODRKZP88ZB9", "SE"),
    ("A1C3SOZRARQ6R3", "PL"),
];

/// Resolves the storefront country for a marketplace id.
pub fn marketplace_country(id: &MarketplaceId) -> Option<CountryCode> {
    MARKETPLACE_COUNTRIES
        .iter()
        .find(|(mid, _)| *mid == id.as_str())
        .map(|(_, cc)| CountryCode::new(*cc))
}

/// A monetary amount as the channel sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MoneyDto {
    pub currency_code: String,
    pub amount: String,
}

impl MoneyDto {
    /// Parses the decimal amount; malformed values become zero with a
    /// data-quality log line rather than a failed import.
    pub fn to_money(&self) -> Money {
        Money::parse_decimal(&self.amount).unwrap_or_else(|| {
            tracing::warn!(amount = %self.amount, "unparseable money amount, defaulting to 0");
            Money::zero()
        })
    }
}

/// Buyer block, possibly withheld.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BuyerInfoDto {
    pub buyer_name: Option<String>,
    pub buyer_email: Option<String>,
    pub buyer_company_name: Option<String>,
    pub buyer_vat_number: Option<String>,
    pub buyer_tax_registration_id: Option<String>,
}

/// Shipping address block, possibly redacted down to city/postal/country.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AddressDto {
    pub name: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
}

/// One order as listed by the order API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MarketplaceOrderDto {
    pub amazon_order_id: String,
    pub purchase_date: DateTime<Utc>,
    pub order_status: String,
    /// `"AFN"` = fulfilled by the channel, `"MFN"` = by the seller.
    pub fulfillment_channel: Option<String>,
    pub marketplace_id: String,
    #[serde(default)]
    pub is_business_order: Option<bool>,
    #[serde(default)]
    pub order_total: Option<MoneyDto>,
    #[serde(default)]
    pub buyer_info: Option<BuyerInfoDto>,
    #[serde(default)]
    pub shipping_address: Option<AddressDto>,
}

impl MarketplaceOrderDto {
    /// Maps the channel's status string.
    pub fn status(&self) -> MarketplaceStatus {
        match self.order_status.as_str() {
            "Pending" | "PendingAvailability" => MarketplaceStatus::Pending,
            "Unshipped" => MarketplaceStatus::Unshipped,
            "PartiallyShipped" => MarketplaceStatus::PartiallyShipped,
            "Shipped" | "InvoiceUnconfirmed" => MarketplaceStatus::Shipped,
            "Canceled" | "Cancelled" => MarketplaceStatus::Canceled,
            other => {
                tracing::warn!(status = other, "unknown marketplace order status, treating as Pending");
                MarketplaceStatus::Pending
            }
        }
    }

    /// Normalizes into the canonical order shape (without line items,
    /// which arrive via the separate item fetch).
    pub fn to_canonical(&self, channel: Channel) -> CanonicalOrder {
        let marketplace_id = MarketplaceId::new(&self.marketplace_id);
        let country = self
            .shipping_address
            .as_ref()
            .and_then(|a| a.country_code.as_deref())
            .map(CountryCode::new)
            .or_else(|| marketplace_country(&marketplace_id))
            .unwrap_or_else(|| CountryCode::new("XX"));

        let fulfillment = match self.fulfillment_channel.as_deref() {
            Some("AFN") => FulfillmentMode::ChannelFulfilled,
            _ => FulfillmentMode::SellerFulfilled,
        };

        let mut order = CanonicalOrder::imported(
            OrderKey::new(channel, &self.amazon_order_id),
            marketplace_id,
            country,
            fulfillment,
            self.purchase_date,
            self.status(),
        );

        order.is_business_order = self.is_business_order.unwrap_or(false);
        if let Some(total) = &self.order_total {
            order.total = total.to_money();
            order.currency = total.currency_code.clone();
        }
        if let Some(buyer) = &self.buyer_info {
            order.buyer = Buyer {
                name: buyer.buyer_name.clone(),
                email: buyer.buyer_email.clone(),
                company_name: buyer.buyer_company_name.clone(),
                // First non-empty of the channel's VAT-ish fields.
                vat_number: [&buyer.buyer_vat_number, &buyer.buyer_tax_registration_id]
                    .into_iter()
                    .filter_map(|v| v.as_deref())
                    .map(str::trim)
                    .find(|v| !v.is_empty())
                    .map(str::to_string),
            };
        }
        if let Some(addr) = &self.shipping_address {
            order.ship_to = ShippingAddress {
                name: addr.name.clone(),
                street: addr.address_line1.clone(),
                street2: addr.address_line2.clone(),
                city: addr.city.clone(),
                postal_code: addr.postal_code.clone(),
                country: addr.country_code.as_deref().map(CountryCode::new),
            };
        }
        order
    }
}

/// One page of the order listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderPage {
    #[serde(default)]
    pub orders: Vec<MarketplaceOrderDto>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// One order item as listed by the order-items API. Both historical
/// quantity spellings appear in the wild; normalization reconciles them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OrderItemDto {
    pub order_item_id: Option<String>,
    pub seller_sku: String,
    pub title: Option<String>,
    pub quantity_ordered: Option<u32>,
    pub quantity: Option<u32>,
    pub item_price: Option<MoneyDto>,
    pub item_tax: Option<MoneyDto>,
    pub promotion_discount: Option<MoneyDto>,
}

impl OrderItemDto {
    /// Normalizes into a canonical line. Rejected legacy shapes bubble
    /// up as data-quality errors the importer records per item.
    pub fn to_line(&self) -> Result<OrderLine, OrderError> {
        let mut line =
            OrderLine::reconcile(&self.seller_sku, self.quantity, self.quantity_ordered)?;
        line.order_item_id = self.order_item_id.clone();
        line.title = self.title.clone().unwrap_or_default();
        if let Some(price) = &self.item_price {
            line.unit_price = price.to_money();
        }
        if let Some(tax) = &self.item_tax {
            line.tax = tax.to_money();
        }
        if let Some(discount) = &self.promotion_discount {
            line.discount = discount.to_money();
        }
        Ok(line)
    }
}

/// One active listing of the seller on a marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListingDto {
    pub seller_sku: String,
    pub marketplace_id: String,
    /// `"MFN"` listings are the ones whose quantity the seller manages.
    pub fulfillment_type: String,
}

impl ListingDto {
    /// True for listings the stock export manages.
    pub fn is_seller_fulfilled(&self) -> bool {
        self.fulfillment_type == "MFN"
    }
}

/// Item reference inside a shipment confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfirmedItem {
    pub order_item_id: String,
    pub quantity: u32,
}

/// Shipment-confirmation call payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShipmentConfirmation {
    pub amazon_order_id: String,
    pub marketplace_id: String,
    pub carrier_code: String,
    pub tracking_number: String,
    pub ship_date: DateTime<Utc>,
    pub items: Vec<ConfirmedItem>,
}

/// Report status as returned by the reports API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReportStatusDto {
    pub report_id: String,
    pub processing_status: String,
    #[serde(default)]
    pub report_document_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(status: &str, channel: &str) -> MarketplaceOrderDto {
        MarketplaceOrderDto {
            amazon_order_id: "405-1234567-1234567".into(),
            purchase_date: Utc::now(),
            order_status: status.into(),
            fulfillment_channel: Some(channel.into()),
            marketplace_id: "A1PA6795UKMFR9".into(),
            is_business_order: Some(false),
            order_total: Some(MoneyDto {
                currency_code: "EUR".into(),
                amount: "24.99".into(),
            }),
            buyer_info: None,
            shipping_address: None,
        }
    }

    #[test]
    fn status_mapping() {
        assert_eq!(dto("Unshipped", "MFN").status(), MarketplaceStatus::Unshipped);
        assert_eq!(dto("Shipped", "MFN").status(), MarketplaceStatus::Shipped);
        assert_eq!(dto("Canceled", "MFN").status(), MarketplaceStatus::Canceled);
        assert_eq!(dto("Pending", "MFN").status(), MarketplaceStatus::Pending);
        assert_eq!(dto("???", "MFN").status(), MarketplaceStatus::Pending);
    }

    #[test]
    fn canonical_conversion_basics() {
        let order = dto("Unshipped", "MFN").to_canonical(Channel::amazon());
        assert_eq!(order.key.to_string(), "amazon:405-1234567-1234567");
        assert_eq!(order.fulfillment, FulfillmentMode::SellerFulfilled);
        assert_eq!(order.total.minor(), 2499);
        assert_eq!(order.currency, "EUR");
        // No address: storefront country from the marketplace id.
        assert_eq!(order.country.as_str(), "DE");
        assert!(!order.lines_fetched);
    }

    #[test]
    fn afn_maps_to_channel_fulfilled() {
        let order = dto("Shipped", "AFN").to_canonical(Channel::amazon());
        assert_eq!(order.fulfillment, FulfillmentMode::ChannelFulfilled);
    }

    #[test]
    fn address_country_beats_storefront() {
        let mut d = dto("Unshipped", "MFN");
        d.shipping_address = Some(AddressDto {
            country_code: Some("AT".into()),
            city: Some("Wien".into()),
            ..Default::default()
        });
        let order = d.to_canonical(Channel::amazon());
        assert_eq!(order.country.as_str(), "AT");
        assert_eq!(order.ship_to.city.as_deref(), Some("Wien"));
    }

    #[test]
    fn vat_number_first_non_empty() {
        let mut d = dto("Unshipped", "MFN");
        d.buyer_info = Some(BuyerInfoDto {
            buyer_vat_number: Some("".into()),
            buyer_tax_registration_id: Some("DE123456789".into()),
            ..Default::default()
        });
        let order = d.to_canonical(Channel::amazon());
        assert_eq!(order.buyer.vat_number.as_deref(), Some("DE123456789"));
    }

    #[test]
    fn item_to_line_reconciles_quantity() {
        let item = OrderItemDto {
            order_item_id: Some("1111".into()),
            seller_sku: "B42056R4-FBM".into(),
            quantity_ordered: Some(2),
            ..Default::default()
        };
        let line = item.to_line().unwrap();
        assert_eq!(line.quantity, 2);
        assert_eq!(line.order_item_id.as_deref(), Some("1111"));
    }

    #[test]
    fn item_with_conflicting_quantities_is_rejected() {
        let item = OrderItemDto {
            seller_sku: "B42056R4".into(),
            quantity: Some(1),
            quantity_ordered: Some(3),
            ..Default::default()
        };
        assert!(item.to_line().is_err());
    }

    #[test]
    fn wire_deserialization_uses_pascal_case() {
        let json = r#"{
            "AmazonOrderId": "028-1-1",
            "PurchaseDate": "2024-03-01T10:00:00Z",
            "OrderStatus": "Unshipped",
            "FulfillmentChannel": "MFN",
            "MarketplaceId": "AMEN7PMS3EDWL",
            "OrderTotal": {"CurrencyCode": "EUR", "Amount": "9.99"}
        }"#;
        let dto: MarketplaceOrderDto = serde_json::from_str(json).unwrap();
        assert_eq!(dto.amazon_order_id, "028-1-1");
        assert_eq!(dto.order_total.as_ref().unwrap().amount, "9.99");
    }
}
