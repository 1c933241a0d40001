//! Domain error types.

use thiserror::Error;

use crate::order::{ErpStatus, MarketplaceStatus, TrackingPushState};

/// Errors raised by the canonical order record when an operation would
/// break one of its invariants.
#[derive(Debug, Error)]
pub enum OrderError {
    /// An ERP order is already attached; the linkage is immutable.
    #[error("ERP order {existing} already attached, refusing to attach {attempted}")]
    ErpOrderAlreadyAttached { existing: i64, attempted: i64 },

    /// Marketplace status may only move forward (or to Canceled).
    #[error("marketplace status would regress from {from} to {to}")]
    StatusRegression {
        from: MarketplaceStatus,
        to: MarketplaceStatus,
    },

    /// Tracking-push state never moves backwards.
    #[error("tracking push state would regress from {from} to {to}")]
    TrackingPushRegression {
        from: TrackingPushState,
        to: TrackingPushState,
    },

    /// ERP status transition not allowed from the current state.
    #[error("invalid ERP status transition from {from} to {to}")]
    InvalidErpTransition { from: ErpStatus, to: ErpStatus },

    /// A line item carried two conflicting quantity fields.
    #[error("conflicting quantity fields for SKU {sku}: {a} vs {b}")]
    ConflictingQuantities { sku: String, a: u32, b: u32 },

    /// A line item carried no quantity at all.
    #[error("missing quantity for SKU {sku}")]
    MissingQuantity { sku: String },
}
