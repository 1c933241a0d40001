//! Canonical order record and its state machines.

mod record;
mod status;

pub use record::{Buyer, CanonicalOrder, OrderLine, ShippingAddress, SyncState};
pub use status::{ErpStatus, FulfillmentMode, MarketplaceStatus, TrackingPushState};
