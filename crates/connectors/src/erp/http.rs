//! JSON-RPC implementation of the ERP client.
//!
//! Speaks the ERP's `/jsonrpc` endpoint: authenticate once against the
//! `common` service, then issue `execute_kw` calls against the `object`
//! service. The session uid is cached and re-established when the
//! server reports an expired session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::{ConnectorError, Result};

use super::client::{ErpClient, ErpRecord};

/// Configuration of the JSON-RPC ERP client.
#[derive(Debug, Clone)]
pub struct ErpHttpConfig {
    /// Base URL, e.g. `https://erp.example.com`.
    pub base_url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Per-call HTTP timeout.
    pub timeout: Duration,
}

/// ERP client over JSON-RPC.
#[derive(Clone)]
pub struct JsonRpcErpClient {
    config: ErpHttpConfig,
    client: Client,
    uid: Arc<RwLock<Option<i64>>>,
    next_call_id: Arc<AtomicU64>,
}

impl JsonRpcErpClient {
    /// Builds the client; fails only on TLS/runtime setup.
    pub fn new(config: ErpHttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ConnectorError::Transport)?;
        Ok(Self {
            config,
            client,
            uid: Arc::new(RwLock::new(None)),
            next_call_id: Arc::new(AtomicU64::new(1)),
        })
    }

    async fn rpc(&self, service: &str, method: &str, args: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "id": self.next_call_id.fetch_add(1, Ordering::Relaxed),
            "params": {
                "service": service,
                "method": method,
                "args": args,
            }
        });
        let response = self
            .client
            .post(format!(
                "{}/jsonrpc",
                self.config.base_url.trim_end_matches('/')
            ))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ConnectorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Value = response.json().await?;
        if let Some(error) = envelope.get("error") {
            let message = error
                .pointer("/data/message")
                .or_else(|| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC fault")
                .to_string();
            return Err(ConnectorError::Rpc(message));
        }
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Authenticates and caches the session uid.
    async fn uid(&self) -> Result<i64> {
        if let Some(uid) = *self.uid.read().await {
            return Ok(uid);
        }
        let result = self
            .rpc(
                "common",
                "authenticate",
                json!([
                    self.config.database,
                    self.config.username,
                    self.config.password,
                    {}
                ]),
            )
            .await?;
        let uid = result
            .as_i64()
            .ok_or_else(|| ConnectorError::Auth("authentication rejected".to_string()))?;
        debug!(uid, "authenticated against ERP");
        *self.uid.write().await = Some(uid);
        Ok(uid)
    }

    #[instrument(skip(self, args, kwargs))]
    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value> {
        let uid = self.uid().await?;
        let result = self
            .rpc(
                "object",
                "execute_kw",
                json!([
                    self.config.database,
                    uid,
                    self.config.password,
                    model,
                    method,
                    args,
                    kwargs
                ]),
            )
            .await;
        if let Err(ConnectorError::Rpc(message)) = &result {
            // A dropped session authenticates again on the next call.
            if message.contains("Session") || message.contains("session") {
                *self.uid.write().await = None;
            }
        }
        result
    }
}

#[async_trait]
impl ErpClient for JsonRpcErpClient {
    async fn search_read(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        limit: Option<u32>,
    ) -> Result<Vec<ErpRecord>> {
        let mut kwargs = json!({ "fields": fields });
        if let Some(limit) = limit {
            kwargs["limit"] = json!(limit);
        }
        let result = self
            .execute_kw(model, "search_read", json!([domain]), kwargs)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn create(&self, model: &str, values: Value) -> Result<i64> {
        let result = self
            .execute_kw(model, "create", json!([values]), json!({}))
            .await?;
        result.as_i64().ok_or_else(|| {
            ConnectorError::Rpc(format!("create on {model} returned a non-id result"))
        })
    }

    async fn write(&self, model: &str, ids: &[i64], values: Value) -> Result<()> {
        self.execute_kw(model, "write", json!([ids, values]), json!({}))
            .await?;
        Ok(())
    }

    async fn execute(&self, model: &str, method: &str, ids: &[i64]) -> Result<Value> {
        self.execute_kw(model, method, json!([ids]), json!({})).await
    }
}
