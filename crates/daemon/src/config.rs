//! Daemon configuration loaded from environment variables.

use std::collections::HashMap;
use std::time::Duration;

/// Everything the daemon needs to wire the engine.
///
/// Reads from environment variables; anything optional has a default
/// that matches the production deployment:
/// - `DATABASE_URL` — Postgres connection string
/// - `MARKETPLACE_BASE_URL`, `MARKETPLACE_ACCESS_TOKEN`, `SELLER_ID`
/// - `MARKETPLACE_IDS` — comma-separated marketplace ids
/// - `ERP_URL`, `ERP_DATABASE`, `ERP_USERNAME`, `ERP_PASSWORD`
/// - `SHIP_FROM_COUNTRY` (default `BE`)
/// - `SYNC_INTERVAL_SECS` (default 600), `STOCK_INTERVAL_SECS` (default 3600)
/// - `API_CALL_DELAY_MS` — fixed delay before marketplace calls (default 500)
/// - `SAFETY_STOCK_DEFAULT` (default 10)
/// - `AUTO_CONFIRM_ORDERS` (default true)
/// - `JOURNAL_EXPORT`, `JOURNAL_CROSS_BORDER`, `JOURNAL_DOMESTIC`
///   (`BE=VBE,DE=VDE` style), `FISCAL_POSITION_EXPORT`, `FISCAL_POSITION_OSS`
/// - `NOTIFY_WEBHOOK_URL` — optional unresolved-SKU webhook
/// - `HOST`/`PORT` — health/metrics endpoint (default `0.0.0.0:3000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub marketplace_base_url: String,
    pub marketplace_access_token: String,
    pub seller_id: String,
    pub marketplace_ids: Vec<String>,
    pub erp_url: String,
    pub erp_database: String,
    pub erp_username: String,
    pub erp_password: String,
    pub ship_from_country: String,
    pub sync_interval: Duration,
    pub stock_interval: Duration,
    pub api_call_delay: Duration,
    pub safety_stock_default: f64,
    pub auto_confirm_orders: bool,
    pub journal_export: String,
    pub journal_cross_border: String,
    pub journal_domestic: HashMap<String, String>,
    pub fiscal_position_export: String,
    pub fiscal_position_oss: String,
    pub notify_webhook_url: Option<String>,
    pub host: String,
    pub port: u16,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        var(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

/// Parses `BE=VBE,DE=VDE` into a country → journal-code map.
fn parse_journal_map(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (country, code) = pair.split_once('=')?;
            let country = country.trim().to_uppercase();
            let code = code.trim().to_string();
            if country.is_empty() || code.is_empty() {
                None
            } else {
                Some((country, code))
            }
        })
        .collect()
}

impl Config {
    /// Loads configuration from the environment.
    pub fn from_env() -> Self {
        Self {
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost/backoffice".to_string()),
            marketplace_base_url: var("MARKETPLACE_BASE_URL")
                .unwrap_or_else(|| "https://sellingpartnerapi-eu.amazon.com".to_string()),
            marketplace_access_token: var("MARKETPLACE_ACCESS_TOKEN").unwrap_or_default(),
            seller_id: var("SELLER_ID").unwrap_or_default(),
            marketplace_ids: var("MARKETPLACE_IDS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            erp_url: var("ERP_URL").unwrap_or_else(|| "http://localhost:8069".to_string()),
            erp_database: var("ERP_DATABASE").unwrap_or_default(),
            erp_username: var("ERP_USERNAME").unwrap_or_default(),
            erp_password: var("ERP_PASSWORD").unwrap_or_default(),
            ship_from_country: var("SHIP_FROM_COUNTRY").unwrap_or_else(|| "BE".to_string()),
            sync_interval: parse_secs("SYNC_INTERVAL_SECS", 600),
            stock_interval: parse_secs("STOCK_INTERVAL_SECS", 3600),
            api_call_delay: Duration::from_millis(
                var("API_CALL_DELAY_MS").and_then(|v| v.parse().ok()).unwrap_or(500),
            ),
            safety_stock_default: var("SAFETY_STOCK_DEFAULT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            auto_confirm_orders: var("AUTO_CONFIRM_ORDERS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            journal_export: var("JOURNAL_EXPORT").unwrap_or_else(|| "VEXP".to_string()),
            journal_cross_border: var("JOURNAL_CROSS_BORDER")
                .unwrap_or_else(|| "VOSS".to_string()),
            journal_domestic: var("JOURNAL_DOMESTIC")
                .map(|v| parse_journal_map(&v))
                .unwrap_or_default(),
            fiscal_position_export: var("FISCAL_POSITION_EXPORT")
                .unwrap_or_else(|| "Export".to_string()),
            fiscal_position_oss: var("FISCAL_POSITION_OSS").unwrap_or_else(|| "OSS".to_string()),
            notify_webhook_url: var("NOTIFY_WEBHOOK_URL"),
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: var("PORT").and_then(|p| p.parse().ok()).unwrap_or(3000),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_map_parsing() {
        let map = parse_journal_map("BE=VBE, DE=VDE,=X,FR=");
        assert_eq!(map.len(), 2);
        assert_eq!(map["BE"], "VBE");
        assert_eq!(map["DE"], "VDE");
    }

    #[test]
    fn journal_map_empty() {
        assert!(parse_journal_map("").is_empty());
    }
}
