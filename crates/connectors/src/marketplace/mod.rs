//! Marketplace API client.

mod client;
mod http;
mod memory;
mod reports;
pub mod types;

pub use client::MarketplaceClient;
pub use http::{HttpMarketplaceClient, MarketplaceHttpConfig};
pub use memory::{CapturedPatch, InMemoryMarketplaceClient};
pub use reports::{ReportPoller, ReportState};
pub use types::{
    AddressDto, BuyerInfoDto, ConfirmedItem, ListingDto, MarketplaceOrderDto, MoneyDto,
    OrderItemDto, OrderPage, ReportStatusDto, ShipmentConfirmation,
};
