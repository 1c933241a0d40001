//! Sync daemon entry point.

mod config;

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use common::{Channel, CountryCode, MarketplaceId};
use connectors::{
    CallThrottle, ErpHttpConfig, HttpMarketplaceClient, JsonRpcErpClient, MarketplaceHttpConfig,
    RetryPolicy, WebhookNotifier,
};
use domain::SkuResolver;
use engine::{
    CreateOptions, CycleConfig, JournalRouting, ListingsCache, Scheduler, SchedulerConfig,
    StockExportEngine, SyncCycle,
};
use store::{
    PostgresExportLog, PostgresOrderStore, PostgresSkuOverrides, SkuOverrideSource,
};

use config::Config;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Stores
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to Postgres");
    let order_store = PostgresOrderStore::new(pool.clone());
    order_store
        .run_migrations()
        .await
        .expect("database migration failed");
    let export_log = PostgresExportLog::new(pool.clone());

    // 4. SKU override table, loaded once per process lifetime
    let overrides = PostgresSkuOverrides::new(pool)
        .load_all()
        .await
        .expect("failed to load SKU override table");
    tracing::info!(entries = overrides.len(), "SKU override table loaded");
    let resolver = Arc::new(SkuResolver::new(overrides));

    // 5. External clients
    let marketplace = HttpMarketplaceClient::new(MarketplaceHttpConfig {
        base_url: config.marketplace_base_url.clone(),
        access_token: config.marketplace_access_token.clone(),
        seller_id: config.seller_id.clone(),
        timeout: Duration::from_secs(30),
    })
    .expect("failed to build marketplace client");
    let erp = JsonRpcErpClient::new(ErpHttpConfig {
        base_url: config.erp_url.clone(),
        database: config.erp_database.clone(),
        username: config.erp_username.clone(),
        password: config.erp_password.clone(),
        timeout: Duration::from_secs(60),
    })
    .expect("failed to build ERP client");
    let notifier = WebhookNotifier::new(config.notify_webhook_url.clone());

    // 6. Engine wiring
    let throttle = Arc::new(CallThrottle::new(config.api_call_delay));
    let retry = RetryPolicy::default();
    let routing = JournalRouting {
        export_journal: config.journal_export.clone(),
        domestic_journals: config.journal_domestic.clone(),
        cross_border_journal: config.journal_cross_border.clone(),
        export_fiscal_position: config.fiscal_position_export.clone(),
        cross_border_fiscal_position: config.fiscal_position_oss.clone(),
    };
    let marketplace_ids: Vec<MarketplaceId> = config
        .marketplace_ids
        .iter()
        .map(MarketplaceId::new)
        .collect();

    let cycle = SyncCycle::new(
        order_store.clone(),
        marketplace.clone(),
        erp.clone(),
        CycleConfig {
            channel: Channel::amazon(),
            resolver: resolver.clone(),
            routing,
            ship_from: CountryCode::new(&config.ship_from_country),
            throttle: throttle.clone(),
            retry: retry.clone(),
            create_options: CreateOptions {
                dry_run: false,
                auto_confirm: config.auto_confirm_orders,
            },
        },
    );
    let stock = StockExportEngine::new(
        marketplace,
        erp,
        notifier,
        export_log,
        resolver,
        ListingsCache::new(marketplace_ids, chrono::Duration::hours(12)),
        throttle,
        retry,
        config.safety_stock_default,
    );
    let scheduler = Arc::new(Scheduler::new(
        cycle,
        stock,
        SchedulerConfig {
            cycle_interval: config.sync_interval,
            stock_interval: config.stock_interval,
            ..SchedulerConfig::default()
        },
    ));

    // 7. Health/metrics endpoint
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr())
        .await
        .expect("failed to bind address");
    tracing::info!(addr = %config.addr(), "health endpoint listening");

    // 8. Run until a shutdown signal arrives
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    let scheduler_task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_signal()).await })
    };

    if let Err(err) = server.await {
        tracing::error!(error = %err, "server error");
    }
    let _ = scheduler_task.await;

    tracing::info!("daemon shut down gracefully");
}
