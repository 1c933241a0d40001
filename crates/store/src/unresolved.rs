//! Stock-export run log and unresolved-SKU tracking.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Window within which an unresolved SKU is not re-reported.
pub const UNRESOLVED_REPORT_WINDOW_HOURS: i64 = 24;

/// Summary row persisted per stock-export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRunRecord {
    pub started_at: DateTime<Utc>,
    pub total_skus: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub items_updated: usize,
    pub items_failed: usize,
    pub dry_run: bool,
}

/// Persistence for stock-export bookkeeping.
#[async_trait]
pub trait ExportLog: Send + Sync {
    /// Appends one run summary.
    async fn record_run(&self, record: &ExportRunRecord) -> Result<()>;

    /// Filters `skus` down to the ones not reported within the recent
    /// window, and marks the returned ones as reported now.
    ///
    /// The dedup window keeps a persistently-unmapped SKU from pinging
    /// the operators every export cycle.
    async fn claim_unreported(&self, skus: &[String]) -> Result<Vec<String>>;
}

/// Cutoff instant for the dedup window.
pub(crate) fn report_window_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(UNRESOLVED_REPORT_WINDOW_HOURS)
}
