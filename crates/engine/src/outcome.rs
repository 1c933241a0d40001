//! Per-phase outcome types.
//!
//! Phases never abort on a single item; they collect per-item errors
//! and counters into these records, which the cycle summary aggregates
//! for the operator-facing log line.

use serde::{Deserialize, Serialize};

/// One failed item inside a batch, identified for the logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    /// Identifier of the failed item (order key, SKU, ...).
    pub item: String,
    pub message: String,
}

impl ItemError {
    /// Builds an entry from an item id and any error.
    pub fn new(item: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            item: item.into(),
            message: message.to_string(),
        }
    }
}

/// Result of one import poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollOutcome {
    /// True when an overlapping poll was discarded by the guard.
    pub skipped: bool,
    pub orders_found: usize,
    pub orders_upserted: usize,
    /// Orders whose line items were attached in the lazy second pass.
    pub items_attached: usize,
    pub errors: Vec<ItemError>,
}

impl PollOutcome {
    /// Outcome of a discarded overlapping poll.
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Result of creating (or finding) the ERP order for one canonical order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateOutcome {
    pub success: bool,
    /// True when an existing ERP order was found and attached instead
    /// of creating one; safe to see arbitrarily often.
    pub skipped: bool,
    pub erp_order_id: Option<i64>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Result of an order-creation batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateBatchOutcome {
    pub checked: usize,
    pub created: usize,
    pub skipped: usize,
    pub errors: Vec<ItemError>,
}

/// Result of the inbound shipment sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipmentOutcome {
    pub checked: usize,
    pub synced: usize,
    pub skipped: usize,
    pub errors: Vec<ItemError>,
}

/// Result of the outbound tracking push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingOutcome {
    pub checked: usize,
    pub pushed: usize,
    pub skipped: usize,
    pub already_pushed: usize,
    pub errors: Vec<ItemError>,
}

/// Result of the cancellation sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CancelOutcome {
    pub checked: usize,
    pub canceled: usize,
    pub skipped: usize,
    pub errors: Vec<ItemError>,
}

/// Options for one stock export run.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockOptions {
    /// Compute and log, but do not submit quantities.
    pub dry_run: bool,
}

/// Result of one stock export run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockOutcome {
    pub total_skus: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub items_updated: usize,
    pub items_failed: usize,
    pub summary: String,
}
