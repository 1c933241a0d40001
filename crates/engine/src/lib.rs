//! Bidirectional order/inventory synchronization engine.
//!
//! A cycle runs the phases in sequence: import marketplace orders,
//! create ERP orders, reflect channel-fulfilled shipments inbound, push
//! seller tracking numbers outbound, reconcile cancellations. Stock
//! export runs on its own longer schedule. Every phase is re-entrant:
//! re-running a step on an already-processed order is a no-op, and one
//! item's failure never aborts the rest of a phase or the cycle.

pub mod cancellations;
pub mod caches;
pub mod creator;
pub mod cycle;
pub mod error;
pub mod importer;
pub mod outcome;
pub mod scheduler;
pub mod shipments;
pub mod stock;
pub mod tracking;

pub use cancellations::{CancelResult, CanceledOrderSync};
pub use caches::ErpLookupCache;
pub use creator::{CreateOptions, JournalRouting, OrderCreator};
pub use cycle::{CycleConfig, CycleSummary, SyncCycle};
pub use error::EngineError;
pub use importer::OrderImporter;
pub use outcome::{
    CancelOutcome, CreateBatchOutcome, CreateOutcome, ItemError, PollOutcome, ShipmentOutcome,
    StockOptions, StockOutcome, TrackingOutcome,
};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use shipments::ShipmentSync;
pub use stock::{ListingsCache, StockExportEngine};
pub use tracking::TrackingPusher;
