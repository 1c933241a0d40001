//! Report polling as an explicit state machine.
//!
//! Report generation on the marketplace is asynchronous: request, wait
//! for processing, download. Instead of an inline sleep loop, the flow
//! is a state machine advanced by `tick()` calls from the scheduler, so
//! a slow report never blocks a cycle and the state is observable.

use common::MarketplaceId;
use tracing::{debug, warn};

use crate::error::Result;

use super::client::MarketplaceClient;

/// Lifecycle of one report request.
///
/// ```text
/// Idle ──► Requested ──► InQueue ──► Done
///              │            │
///              └────────────┴──► Fatal | Cancelled
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportState {
    /// Nothing requested yet (or the last document was consumed).
    Idle,
    /// Report requested, no status seen yet.
    Requested { report_id: String },
    /// The marketplace is processing the report.
    InQueue { report_id: String },
    /// Finished; the document is ready for download.
    Done { document_id: String },
    /// The marketplace failed the report permanently.
    Fatal,
    /// The marketplace cancelled the report (usually: no data).
    Cancelled,
}

impl ReportState {
    /// True for states from which `tick` will not advance further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReportState::Done { .. } | ReportState::Fatal | ReportState::Cancelled
        )
    }
}

/// Drives one report type through request/poll/download.
pub struct ReportPoller {
    report_type: String,
    marketplace_ids: Vec<MarketplaceId>,
    state: ReportState,
}

impl ReportPoller {
    /// Creates an idle poller for a report type.
    pub fn new(report_type: impl Into<String>, marketplace_ids: Vec<MarketplaceId>) -> Self {
        Self {
            report_type: report_type.into(),
            marketplace_ids,
            state: ReportState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> &ReportState {
        &self.state
    }

    /// Advances the state machine by one step.
    ///
    /// Idle requests a new report; Requested/InQueue poll the status
    /// once; terminal states are left alone. One tick never waits for
    /// the marketplace beyond a single call.
    pub async fn tick<M: MarketplaceClient + ?Sized>(&mut self, client: &M) -> Result<&ReportState> {
        self.state = match std::mem::replace(&mut self.state, ReportState::Idle) {
            ReportState::Idle => {
                let report_id = client
                    .create_report(&self.report_type, &self.marketplace_ids)
                    .await?;
                debug!(report_id, report_type = %self.report_type, "report requested");
                ReportState::Requested { report_id }
            }
            ReportState::Requested { report_id } | ReportState::InQueue { report_id } => {
                let status = client.report_status(&report_id).await?;
                match status.processing_status.as_str() {
                    "DONE" => match status.report_document_id {
                        Some(document_id) => ReportState::Done { document_id },
                        None => {
                            warn!(report_id, "report done without document id");
                            ReportState::Fatal
                        }
                    },
                    "FATAL" => ReportState::Fatal,
                    "CANCELLED" => ReportState::Cancelled,
                    _ => ReportState::InQueue { report_id },
                }
            }
            terminal => terminal,
        };
        Ok(&self.state)
    }

    /// Downloads the finished document and resets to Idle.
    ///
    /// Returns `None` when the poller is not in the Done state.
    pub async fn take_document<M: MarketplaceClient + ?Sized>(
        &mut self,
        client: &M,
    ) -> Result<Option<String>> {
        let ReportState::Done { document_id } = &self.state else {
            return Ok(None);
        };
        let content = client.download_report(document_id).await?;
        self.state = ReportState::Idle;
        Ok(Some(content))
    }

    /// Resets a failed poller so the next tick re-requests.
    pub fn reset(&mut self) {
        self.state = ReportState::Idle;
    }
}
