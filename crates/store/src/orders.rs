//! Canonical-order store trait.

use async_trait::async_trait;
use common::OrderKey;
use domain::CanonicalOrder;

use crate::Result;

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Inserted,
    Updated,
}

/// Store of canonical orders, keyed by the composite `channel:order_id`.
///
/// Implementations must make `save` an atomic single-document write; no
/// multi-document transactions are assumed anywhere. The scoped queries
/// exist so each sync phase can enumerate its own work without the
/// engine re-filtering full scans.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Loads one order.
    async fn get(&self, key: &OrderKey) -> Result<Option<CanonicalOrder>>;

    /// Replaces the stored document for this order (atomic, last write
    /// wins within the single-process scheduling model).
    async fn save(&self, order: &CanonicalOrder) -> Result<()>;

    /// Merge-upserts a freshly polled snapshot.
    ///
    /// An existing document is merged via
    /// [`CanonicalOrder::merge_import`], which preserves attached ERP
    /// linkage and fetched line items; a new document is inserted as-is.
    async fn upsert_imported(&self, incoming: CanonicalOrder) -> Result<UpsertKind>;

    /// Orders whose line items have not been fetched yet.
    async fn missing_lines(&self, limit: u32) -> Result<Vec<CanonicalOrder>>;

    /// Orders eligible for ERP creation (lines fetched, no linkage yet,
    /// not pending/canceled).
    async fn eligible_for_creation(&self) -> Result<Vec<CanonicalOrder>>;

    /// Channel-fulfilled orders reported shipped whose ERP delivery is
    /// not done yet.
    async fn pending_inbound_shipments(&self) -> Result<Vec<CanonicalOrder>>;

    /// Seller-fulfilled orders with ERP linkage and no pushed tracking.
    async fn pending_tracking_push(&self) -> Result<Vec<CanonicalOrder>>;

    /// Canceled orders not yet reflected in the ERP.
    async fn pending_cancel_sync(&self) -> Result<Vec<CanonicalOrder>>;
}
