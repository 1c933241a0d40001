//! Persistence for the sync engine.
//!
//! Four collections back the synchronization state: canonical orders
//! (one document per marketplace order), the SKU override table, the
//! stock-export run log, and the unresolved-SKU tracking table. The
//! document store is the only durability boundary; every order update
//! is an atomic single-document write.

pub mod error;
pub mod memory;
pub mod orders;
pub mod overrides;
pub mod postgres;
pub mod unresolved;

pub use error::{Result, StoreError};
pub use memory::{InMemoryExportLog, InMemoryOrderStore, InMemorySkuOverrides};
pub use orders::{OrderStore, UpsertKind};
pub use overrides::SkuOverrideSource;
pub use postgres::{PostgresExportLog, PostgresOrderStore, PostgresSkuOverrides};
pub use unresolved::{ExportLog, ExportRunRecord};
