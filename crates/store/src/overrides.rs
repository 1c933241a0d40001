//! SKU override table source.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::Result;

/// Source of the marketplace-SKU → canonical-SKU override table.
///
/// Loaded once per process lifetime into the [`domain::SkuResolver`];
/// read-only during a cycle.
#[async_trait]
pub trait SkuOverrideSource: Send + Sync {
    /// Loads the full override table.
    async fn load_all(&self) -> Result<HashMap<String, String>>;
}
