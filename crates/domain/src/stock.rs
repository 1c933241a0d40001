//! Sellable-stock arithmetic for the export engine.

use common::MarketplaceId;
use serde::{Deserialize, Serialize};

/// Sellable quantity advertised to the marketplace.
///
/// Free stock minus the safety buffer, floored at zero. Holds for any
/// non-negative inputs: the result is never negative and never exceeds
/// the free quantity.
pub fn sellable_qty(free_qty: f64, safety_stock: f64) -> f64 {
    (free_qty - safety_stock.max(0.0)).max(0.0)
}

/// Outcome of one listing submission during a stock export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Submitted,
    Failed,
    /// Dry-run: computed but not sent.
    Skipped,
}

/// Per-SKU snapshot computed during one export cycle; never persisted
/// beyond the run log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub canonical_sku: String,
    pub free_qty: f64,
    pub safety_stock: f64,
    pub sellable_qty: f64,
    pub marketplaces: Vec<MarketplaceId>,
    pub status: SubmissionStatus,
}

impl StockSnapshot {
    /// Computes the snapshot for one SKU.
    pub fn compute(
        canonical_sku: impl Into<String>,
        free_qty: f64,
        safety_stock: f64,
        marketplaces: Vec<MarketplaceId>,
    ) -> Self {
        let free_qty = free_qty.max(0.0);
        Self {
            canonical_sku: canonical_sku.into(),
            free_qty,
            safety_stock,
            sellable_qty: sellable_qty(free_qty, safety_stock),
            marketplaces,
            status: SubmissionStatus::Pending,
        }
    }
}
