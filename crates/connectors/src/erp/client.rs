//! ERP client trait.
//!
//! The ERP exposes generic RPC primitives (`search_read`, `create`,
//! `write`, method execution) against named entities; everything the
//! engine does on the ERP side composes these four calls.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// One record as returned by `search_read`: field name → value, with
/// the ERP's convention that empty relations read as `false`.
pub type ErpRecord = serde_json::Map<String, Value>;

/// Entity names the engine touches.
pub mod model {
    pub const SALE_ORDER: &str = "sale.order";
    pub const SALE_ORDER_LINE: &str = "sale.order.line";
    pub const STOCK_PICKING: &str = "stock.picking";
    pub const STOCK_MOVE: &str = "stock.move";
    pub const RES_PARTNER: &str = "res.partner";
    pub const RES_COUNTRY: &str = "res.country";
    pub const PRODUCT_PRODUCT: &str = "product.product";
    pub const ACCOUNT_MOVE: &str = "account.move";
    pub const ACCOUNT_JOURNAL: &str = "account.journal";
    pub const FISCAL_POSITION: &str = "account.fiscal.position";
}

/// Generic RPC surface of the ERP.
///
/// `domain` is the ERP's own filter notation: a JSON array of
/// `[field, operator, value]` triples, implicitly AND-ed.
#[async_trait]
pub trait ErpClient: Send + Sync {
    /// Searches records and reads the requested fields.
    async fn search_read(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        limit: Option<u32>,
    ) -> Result<Vec<ErpRecord>>;

    /// Creates one record, returning its id.
    async fn create(&self, model: &str, values: Value) -> Result<i64>;

    /// Writes fields on existing records.
    async fn write(&self, model: &str, ids: &[i64], values: Value) -> Result<()>;

    /// Executes a model method (workflow action) on records.
    async fn execute(&self, model: &str, method: &str, ids: &[i64]) -> Result<Value>;
}

/// Reads an id out of a relation field, which the ERP serializes as
/// `[id, display_name]`, a bare id, or `false` when empty.
pub fn relation_id(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Array(pair) => pair.first().and_then(Value::as_i64),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn relation_id_handles_erp_shapes() {
        assert_eq!(relation_id(Some(&json!([7, "Partner"]))), Some(7));
        assert_eq!(relation_id(Some(&json!(12))), Some(12));
        assert_eq!(relation_id(Some(&json!(false))), None);
        assert_eq!(relation_id(None), None);
    }
}
