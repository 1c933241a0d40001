//! Outbound notification collaborator.
//!
//! Used only for unresolved-SKU alerts; never load-bearing for sync
//! correctness. A missing or failing webhook degrades to a log line
//! and the cycle continues.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Notification sink for operator-facing alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Reports SKUs the resolver could not map. Infallible by design:
    /// implementations swallow and log their own failures.
    async fn notify_unresolved_skus(&self, skus: &[String]);
}

/// Webhook notifier posting a simple card message.
pub struct WebhookNotifier {
    url: Option<String>,
    client: Client,
}

impl WebhookNotifier {
    /// Creates a notifier; `None` disables delivery entirely.
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_unresolved_skus(&self, skus: &[String]) {
        if skus.is_empty() {
            return;
        }
        let Some(url) = &self.url else {
            debug!(count = skus.len(), "no notification webhook configured, skipping");
            return;
        };
        let body = json!({
            "title": "Unresolved marketplace SKUs",
            "text": format!(
                "{} SKU(s) could not be mapped to ERP products:\n{}",
                skus.len(),
                skus.join("\n")
            ),
        });
        match self.client.post(url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(status = %response.status(), "unresolved-SKU notification rejected");
            }
            Err(err) => {
                warn!(error = %err, "unresolved-SKU notification failed");
            }
        }
    }
}

/// Capturing notifier for tests.
#[derive(Clone, Default)]
pub struct CaptureNotifier {
    reported: Arc<RwLock<Vec<String>>>,
}

impl CaptureNotifier {
    /// Creates an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// All SKUs reported so far.
    pub async fn reported(&self) -> Vec<String> {
        self.reported.read().await.clone()
    }
}

#[async_trait]
impl Notifier for CaptureNotifier {
    async fn notify_unresolved_skus(&self, skus: &[String]) {
        self.reported.write().await.extend(skus.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_webhook_degrades_silently() {
        let notifier = WebhookNotifier::new(None);
        // Must not panic or error.
        notifier
            .notify_unresolved_skus(&["B42056R4".to_string()])
            .await;
    }

    #[tokio::test]
    async fn capture_notifier_collects() {
        let notifier = CaptureNotifier::new();
        notifier.notify_unresolved_skus(&["A".to_string()]).await;
        notifier.notify_unresolved_skus(&["B".to_string()]).await;
        assert_eq!(notifier.reported().await, vec!["A", "B"]);
    }
}
