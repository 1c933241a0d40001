//! Engine error types.

use thiserror::Error;

/// Errors crossing a sync phase boundary.
///
/// Most failures stay inside a phase as per-item entries in its
/// outcome; this type is for the helpers that genuinely fail as a
/// whole (store unavailable, ERP rejected a lookup, ...).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Document store failure.
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    /// Marketplace or ERP connector failure.
    #[error("connector error: {0}")]
    Connector(#[from] connectors::ConnectorError),

    /// Canonical-order invariant violation.
    #[error("order invariant: {0}")]
    Order(#[from] domain::OrderError),

    /// The order referenced by a phase call does not exist.
    #[error("unknown order: {0}")]
    UnknownOrder(common::OrderKey),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
