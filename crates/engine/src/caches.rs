//! Cycle-scoped ERP lookup caches.
//!
//! Resolved partner, product, country and journal ids are cached per
//! cycle so a batch of orders from the same customer or catalog does
//! not hammer the ERP with identical searches. The cycle runner resets
//! the cache at the start of every cycle; losing it on restart is
//! harmless, it only costs lookups.

use std::collections::HashMap;

use tokio::sync::Mutex;

#[derive(Default)]
struct Maps {
    partners: HashMap<String, i64>,
    products: HashMap<String, i64>,
    countries: HashMap<String, i64>,
    journals: HashMap<String, i64>,
    fiscal_positions: HashMap<String, i64>,
}

/// Shared lookup cache, explicit and injected rather than module-global.
#[derive(Default)]
pub struct ErpLookupCache {
    maps: Mutex<Maps>,
}

impl ErpLookupCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything; called at cycle start.
    pub async fn reset(&self) {
        *self.maps.lock().await = Maps::default();
    }

    pub async fn partner(&self, key: &str) -> Option<i64> {
        self.maps.lock().await.partners.get(key).copied()
    }

    pub async fn remember_partner(&self, key: impl Into<String>, id: i64) {
        self.maps.lock().await.partners.insert(key.into(), id);
    }

    pub async fn product(&self, code: &str) -> Option<i64> {
        self.maps.lock().await.products.get(code).copied()
    }

    pub async fn remember_product(&self, code: impl Into<String>, id: i64) {
        self.maps.lock().await.products.insert(code.into(), id);
    }

    pub async fn country(&self, code: &str) -> Option<i64> {
        self.maps.lock().await.countries.get(code).copied()
    }

    pub async fn remember_country(&self, code: impl Into<String>, id: i64) {
        self.maps.lock().await.countries.insert(code.into(), id);
    }

    pub async fn journal(&self, code: &str) -> Option<i64> {
        self.maps.lock().await.journals.get(code).copied()
    }

    pub async fn remember_journal(&self, code: impl Into<String>, id: i64) {
        self.maps.lock().await.journals.insert(code.into(), id);
    }

    pub async fn fiscal_position(&self, name: &str) -> Option<i64> {
        self.maps.lock().await.fiscal_positions.get(name).copied()
    }

    pub async fn remember_fiscal_position(&self, name: impl Into<String>, id: i64) {
        self.maps.lock().await.fiscal_positions.insert(name.into(), id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reset_clears_everything() {
        let cache = ErpLookupCache::new();
        cache.remember_partner("jane", 1).await;
        cache.remember_product("B42056R4", 2).await;
        assert_eq!(cache.partner("jane").await, Some(1));

        cache.reset().await;
        assert_eq!(cache.partner("jane").await, None);
        assert_eq!(cache.product("B42056R4").await, None);
    }
}
