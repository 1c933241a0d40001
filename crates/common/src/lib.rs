//! Shared identifier and value types used across the sync engine.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{Channel, CountryCode, MarketplaceId, OrderKey, ParseOrderKeyError};
