//! Domain core for the marketplace ↔ ERP synchronization engine.
//!
//! Everything in this crate is pure: the canonical order record and its
//! state machines, SKU resolution, fiscal-regime routing, sellable-stock
//! arithmetic, and the named string heuristics the marketplace API forces
//! on us. All I/O lives in the `store`, `connectors` and `engine` crates.

pub mod error;
pub mod heuristics;
pub mod order;
pub mod routing;
pub mod sku;
pub mod stock;

pub use error::OrderError;
pub use order::{
    Buyer, CanonicalOrder, ErpStatus, FulfillmentMode, MarketplaceStatus, OrderLine,
    ShippingAddress, SyncState, TrackingPushState,
};
pub use routing::FiscalRegime;
pub use sku::{MatchType, Resolution, SkuResolver};
pub use stock::{sellable_qty, StockSnapshot, SubmissionStatus};
