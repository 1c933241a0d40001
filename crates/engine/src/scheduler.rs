//! Fixed-interval scheduling of sync cycles and stock exports.
//!
//! Single process, single active cycle: a boolean guard makes any
//! concurrent trigger a discarded no-op, never a queued one. The order
//! cycle and the stock export share the guard because both talk to the
//! same external systems.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use connectors::erp::ErpClient;
use connectors::{MarketplaceClient, Notifier};
use store::{ExportLog, OrderStore};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cycle::{CycleSummary, SyncCycle};
use crate::outcome::{StockOptions, StockOutcome};
use crate::stock::StockExportEngine;

/// Scheduler timing configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between order sync cycles.
    pub cycle_interval: Duration,
    /// Interval between stock exports (longer-period schedule).
    pub stock_interval: Duration,
    /// How far back the very first poll looks.
    pub initial_lookback: chrono::Duration,
    /// Overlap subtracted from the watermark each poll, so clock skew
    /// between us and the marketplace never loses an order.
    pub poll_overlap: chrono::Duration,
    /// Stock export options used on schedule.
    pub stock_options: StockOptions,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(600),
            stock_interval: Duration::from_secs(3600),
            initial_lookback: chrono::Duration::days(7),
            poll_overlap: chrono::Duration::minutes(10),
            stock_options: StockOptions::default(),
        }
    }
}

/// Drives the engine on fixed intervals until shutdown.
pub struct Scheduler<S, M, E, N, L> {
    cycle: SyncCycle<S, M, E>,
    stock: StockExportEngine<M, E, N, L>,
    config: SchedulerConfig,
    busy: AtomicBool,
    watermark: Mutex<DateTime<Utc>>,
}

impl<S, M, E, N, L> Scheduler<S, M, E, N, L>
where
    S: OrderStore + Clone,
    M: MarketplaceClient + Clone,
    E: ErpClient + Clone,
    N: Notifier,
    L: ExportLog,
{
    /// Creates the scheduler.
    pub fn new(
        cycle: SyncCycle<S, M, E>,
        stock: StockExportEngine<M, E, N, L>,
        config: SchedulerConfig,
    ) -> Self {
        let watermark = Utc::now() - config.initial_lookback;
        Self {
            cycle,
            stock,
            config,
            busy: AtomicBool::new(false),
            watermark: Mutex::new(watermark),
        }
    }

    fn try_begin(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn end(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// Runs one order cycle unless another run is in flight.
    pub async fn tick_cycle(&self) -> Option<CycleSummary> {
        if !self.try_begin() {
            debug!("cycle already running, discarding trigger");
            return None;
        }
        let since = *self.watermark.lock().await;
        let cycle_start = Utc::now();
        let summary = self.cycle.run(since).await;
        // Advance the watermark only after a poll actually ran.
        if !summary.import.skipped {
            *self.watermark.lock().await = cycle_start - self.config.poll_overlap;
        }
        self.end();
        Some(summary)
    }

    /// Runs one stock export unless another run is in flight.
    pub async fn tick_stock(&self) -> Option<StockOutcome> {
        if !self.try_begin() {
            debug!("cycle already running, discarding stock trigger");
            return None;
        }
        let outcome = self.stock.sync_stock(self.config.stock_options).await;
        self.end();
        Some(outcome)
    }

    /// Loops on the configured intervals until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut cycle_timer = tokio::time::interval(self.config.cycle_interval);
        cycle_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stock_timer = tokio::time::interval(self.config.stock_interval);
        stock_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            cycle_interval_secs = self.config.cycle_interval.as_secs(),
            stock_interval_secs = self.config.stock_interval.as_secs(),
            "scheduler started"
        );
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("scheduler shutting down");
                    break;
                }
                _ = cycle_timer.tick() => {
                    self.tick_cycle().await;
                }
                _ = stock_timer.tick() => {
                    self.tick_stock().await;
                }
            }
        }
    }
}
