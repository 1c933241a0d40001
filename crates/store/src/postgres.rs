//! PostgreSQL-backed store implementations.
//!
//! One row per canonical order: the full document lives in a JSONB
//! column, with a handful of scalar columns mirrored out of it so the
//! per-phase work queries stay index-friendly. All writes are single-row
//! statements; the merge in `upsert_imported` happens in process and is
//! re-written as one row, which is the atomicity the single-scheduler
//! deployment model needs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};

use common::OrderKey;
use domain::CanonicalOrder;

use crate::orders::{OrderStore, UpsertKind};
use crate::overrides::SkuOverrideSource;
use crate::unresolved::{report_window_cutoff, ExportLog, ExportRunRecord};
use crate::{Result, StoreError};

/// PostgreSQL canonical-order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<CanonicalOrder> {
        let doc: serde_json::Value = row.try_get("doc")?;
        Ok(serde_json::from_value(doc)?)
    }

    async fn write_row(&self, order: &CanonicalOrder) -> Result<()> {
        let doc = serde_json::to_value(order)?;
        sqlx::query(
            r#"
            INSERT INTO canonical_orders
                (key, channel, order_id, status, fulfillment, erp_order_id,
                 erp_status, tracking_pushed, cancel_synced, lines_fetched,
                 line_count, purchase_date, doc, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (key) DO UPDATE SET
                status = EXCLUDED.status,
                fulfillment = EXCLUDED.fulfillment,
                erp_order_id = EXCLUDED.erp_order_id,
                erp_status = EXCLUDED.erp_status,
                tracking_pushed = EXCLUDED.tracking_pushed,
                cancel_synced = EXCLUDED.cancel_synced,
                lines_fetched = EXCLUDED.lines_fetched,
                line_count = EXCLUDED.line_count,
                doc = EXCLUDED.doc,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(order.key.to_string())
        .bind(order.key.channel.as_str())
        .bind(&order.key.order_id)
        .bind(order.status.to_string())
        .bind(order.fulfillment.to_string())
        .bind(order.sync.erp_order_id)
        .bind(order.sync.erp_status.to_string())
        .bind(order.sync.tracking_push.is_pushed())
        .bind(order.sync.cancel_synced)
        .bind(order.lines_fetched)
        .bind(order.lines.len() as i32)
        .bind(order.purchase_date)
        .bind(doc)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_where(&self, predicate: &str) -> Result<Vec<CanonicalOrder>> {
        let sql = format!(
            "SELECT doc FROM canonical_orders WHERE {predicate} ORDER BY purchase_date ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn get(&self, key: &OrderKey) -> Result<Option<CanonicalOrder>> {
        let row = sqlx::query("SELECT doc FROM canonical_orders WHERE key = $1")
            .bind(key.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn save(&self, order: &CanonicalOrder) -> Result<()> {
        self.write_row(order).await
    }

    async fn upsert_imported(&self, incoming: CanonicalOrder) -> Result<UpsertKind> {
        match self.get(&incoming.key).await? {
            Some(mut existing) => {
                existing.merge_import(&incoming);
                self.write_row(&existing).await?;
                Ok(UpsertKind::Updated)
            }
            None => {
                self.write_row(&incoming).await?;
                Ok(UpsertKind::Inserted)
            }
        }
    }

    async fn missing_lines(&self, limit: u32) -> Result<Vec<CanonicalOrder>> {
        let rows = sqlx::query(
            r#"
            SELECT doc FROM canonical_orders
            WHERE NOT lines_fetched AND status <> 'Pending'
            ORDER BY purchase_date ASC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn eligible_for_creation(&self) -> Result<Vec<CanonicalOrder>> {
        self.fetch_where(
            "lines_fetched AND line_count > 0 AND erp_order_id IS NULL \
             AND status NOT IN ('Pending', 'Canceled')",
        )
        .await
    }

    async fn pending_inbound_shipments(&self) -> Result<Vec<CanonicalOrder>> {
        self.fetch_where(
            "fulfillment = 'channel-fulfilled' AND status = 'Shipped' \
             AND erp_order_id IS NOT NULL AND erp_status NOT IN ('done', 'canceled')",
        )
        .await
    }

    async fn pending_tracking_push(&self) -> Result<Vec<CanonicalOrder>> {
        self.fetch_where(
            "fulfillment = 'seller-fulfilled' AND erp_order_id IS NOT NULL \
             AND NOT tracking_pushed AND status <> 'Canceled'",
        )
        .await
    }

    async fn pending_cancel_sync(&self) -> Result<Vec<CanonicalOrder>> {
        self.fetch_where(
            "status = 'Canceled' AND NOT cancel_synced AND erp_order_id IS NOT NULL",
        )
        .await
    }
}

/// PostgreSQL SKU override table.
#[derive(Clone)]
pub struct PostgresSkuOverrides {
    pool: PgPool,
}

impl PostgresSkuOverrides {
    /// Creates the source over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SkuOverrideSource for PostgresSkuOverrides {
    async fn load_all(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT marketplace_sku, canonical_sku FROM sku_overrides")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("marketplace_sku")?,
                    row.try_get::<String, _>("canonical_sku")?,
                ))
            })
            .collect::<std::result::Result<HashMap<_, _>, sqlx::Error>>()
            .map_err(StoreError::Database)
    }
}

/// PostgreSQL export log (run summaries + unresolved-SKU dedup table).
#[derive(Clone)]
pub struct PostgresExportLog {
    pool: PgPool,
}

impl PostgresExportLog {
    /// Creates the log over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExportLog for PostgresExportLog {
    async fn record_run(&self, record: &ExportRunRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_export_runs
                (started_at, total_skus, resolved, unresolved,
                 items_updated, items_failed, dry_run)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.started_at)
        .bind(record.total_skus as i64)
        .bind(record.resolved as i64)
        .bind(record.unresolved as i64)
        .bind(record.items_updated as i64)
        .bind(record.items_failed as i64)
        .bind(record.dry_run)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_unreported(&self, skus: &[String]) -> Result<Vec<String>> {
        let now = Utc::now();
        let cutoff = report_window_cutoff(now);
        let mut fresh = Vec::new();
        for sku in skus {
            // Row is returned only when the SKU was never reported or
            // its last report fell out of the window.
            let claimed: Option<String> = sqlx::query_scalar(
                r#"
                INSERT INTO unresolved_skus (sku, reported_at)
                VALUES ($1, $2)
                ON CONFLICT (sku) DO UPDATE SET reported_at = EXCLUDED.reported_at
                WHERE unresolved_skus.reported_at <= $3
                RETURNING sku
                "#,
            )
            .bind(sku)
            .bind(now)
            .bind(cutoff)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(sku) = claimed {
                fresh.push(sku);
            }
        }
        Ok(fresh)
    }
}
