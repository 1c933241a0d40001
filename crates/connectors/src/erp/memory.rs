//! In-memory ERP for engine tests.
//!
//! Models enough of the ERP's behavior to exercise the sync phases:
//! generic records with `search_read`/`create`/`write`, and the
//! workflow methods the engine calls (`action_confirm`,
//! `action_assign`, `button_validate`, `action_cancel`) with their
//! real state effects, including delivery creation on confirmation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use crate::error::{ConnectorError, Result};

use super::client::{ErpClient, ErpRecord};

#[derive(Default)]
struct State {
    records: HashMap<String, Vec<ErpRecord>>,
    next_id: i64,
    fail_on_create: Option<String>,
    validate_requires_confirmation: bool,
    create_counts: HashMap<String, usize>,
}

impl State {
    fn insert(&mut self, model: &str, mut values: ErpRecord) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        values.insert("id".to_string(), json!(id));
        self.records.entry(model.to_string()).or_default().push(values);
        id
    }

    fn find_mut(&mut self, model: &str, id: i64) -> Option<&mut ErpRecord> {
        self.records
            .get_mut(model)?
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_i64) == Some(id))
    }
}

/// In-memory ERP client.
#[derive(Clone, Default)]
pub struct InMemoryErp {
    state: Arc<RwLock<State>>,
}

impl InMemoryErp {
    /// Creates an empty ERP.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds one record, returning its id.
    pub async fn seed(&self, model: &str, values: Value) -> i64 {
        let values = values
            .as_object()
            .cloned()
            .expect("seed values must be a JSON object");
        self.state.write().await.insert(model, values)
    }

    /// Makes `create` fail for the given model.
    pub async fn set_fail_on_create(&self, model: &str) {
        self.state.write().await.fail_on_create = Some(model.to_string());
    }

    /// Makes `button_validate` demand explicit move quantities first,
    /// as the real ERP does when nothing was reserved.
    pub async fn set_validate_requires_confirmation(&self, value: bool) {
        self.state.write().await.validate_requires_confirmation = value;
    }

    /// Number of `create` calls a model received.
    pub async fn create_count(&self, model: &str) -> usize {
        self.state
            .read()
            .await
            .create_counts
            .get(model)
            .copied()
            .unwrap_or(0)
    }

    /// Reads one record by id.
    pub async fn record(&self, model: &str, id: i64) -> Option<ErpRecord> {
        self.state
            .read()
            .await
            .records
            .get(model)?
            .iter()
            .find(|r| r.get("id").and_then(Value::as_i64) == Some(id))
            .cloned()
    }

    /// All records of a model.
    pub async fn records(&self, model: &str) -> Vec<ErpRecord> {
        self.state
            .read()
            .await
            .records
            .get(model)
            .cloned()
            .unwrap_or_default()
    }

    fn matches(record: &ErpRecord, domain: &Value) -> bool {
        let Some(clauses) = domain.as_array() else {
            return true;
        };
        clauses.iter().all(|clause| {
            let Some(triple) = clause.as_array() else {
                // Operators like "&" are implicit; anything else passes.
                return true;
            };
            let (Some(field), Some(op)) = (
                triple.first().and_then(Value::as_str),
                triple.get(1).and_then(Value::as_str),
            ) else {
                return true;
            };
            let expected = triple.get(2).cloned().unwrap_or(Value::Null);
            let actual = record.get(field).cloned().unwrap_or(Value::Bool(false));
            match op {
                "=" => loose_eq(&actual, &expected),
                "!=" => !loose_eq(&actual, &expected),
                "in" => expected
                    .as_array()
                    .is_some_and(|set| set.iter().any(|v| loose_eq(&actual, v))),
                "not in" => !expected
                    .as_array()
                    .is_some_and(|set| set.iter().any(|v| loose_eq(&actual, v))),
                "ilike" => match (actual.as_str(), expected.as_str()) {
                    (Some(a), Some(e)) => a.to_lowercase().contains(&e.to_lowercase()),
                    _ => false,
                },
                _ => true,
            }
        })
    }
}

/// Equality that tolerates the ERP's habit of mixing bare ids and
/// `[id, name]` pairs in relation fields.
fn loose_eq(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    let actual_id = match actual {
        Value::Array(pair) => pair.first().and_then(Value::as_i64),
        Value::Number(n) => n.as_i64(),
        _ => None,
    };
    let expected_id = expected.as_i64();
    matches!((actual_id, expected_id), (Some(a), Some(e)) if a == e)
}

#[async_trait]
impl ErpClient for InMemoryErp {
    async fn search_read(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        limit: Option<u32>,
    ) -> Result<Vec<ErpRecord>> {
        let state = self.state.read().await;
        let mut out = Vec::new();
        for record in state.records.get(model).into_iter().flatten() {
            if Self::matches(record, &domain) {
                let mut projected = Map::new();
                projected.insert("id".into(), record.get("id").cloned().unwrap_or(Value::Null));
                for field in fields {
                    projected.insert(
                        (*field).to_string(),
                        record.get(*field).cloned().unwrap_or(Value::Bool(false)),
                    );
                }
                out.push(projected);
                if let Some(limit) = limit {
                    if out.len() >= limit as usize {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    async fn create(&self, model: &str, values: Value) -> Result<i64> {
        let mut state = self.state.write().await;
        if state.fail_on_create.as_deref() == Some(model) {
            return Err(ConnectorError::Rpc(format!("create on {model} failed")));
        }
        *state.create_counts.entry(model.to_string()).or_default() += 1;
        let values = values
            .as_object()
            .cloned()
            .ok_or_else(|| ConnectorError::Rpc("create values must be an object".into()))?;
        Ok(state.insert(model, values))
    }

    async fn write(&self, model: &str, ids: &[i64], values: Value) -> Result<()> {
        let mut state = self.state.write().await;
        let values = values
            .as_object()
            .cloned()
            .ok_or_else(|| ConnectorError::Rpc("write values must be an object".into()))?;
        for id in ids {
            match state.find_mut(model, *id) {
                Some(record) => {
                    for (k, v) in &values {
                        record.insert(k.clone(), v.clone());
                    }
                }
                None => {
                    return Err(ConnectorError::Rpc(format!(
                        "record {model}({id}) does not exist"
                    )))
                }
            }
        }
        Ok(())
    }

    async fn execute(&self, model: &str, method: &str, ids: &[i64]) -> Result<Value> {
        let mut state = self.state.write().await;
        for id in ids {
            match (model, method) {
                ("sale.order", "action_confirm") => {
                    let (name, partner_shipping_id) = {
                        let record = state.find_mut(model, *id).ok_or_else(|| {
                            ConnectorError::Rpc(format!("sale.order({id}) does not exist"))
                        })?;
                        record.insert("state".into(), json!("sale"));
                        (
                            record.get("name").cloned().unwrap_or(Value::Null),
                            record
                                .get("partner_shipping_id")
                                .cloned()
                                .unwrap_or(Value::Bool(false)),
                        )
                    };
                    // Confirmation spawns the outgoing delivery.
                    let mut picking = Map::new();
                    picking.insert("sale_id".into(), json!(id));
                    picking.insert("origin".into(), name);
                    picking.insert("state".into(), json!("confirmed"));
                    picking.insert("partner_id".into(), partner_shipping_id);
                    picking.insert("picking_type_code".into(), json!("outgoing"));
                    picking.insert("carrier_tracking_ref".into(), Value::Bool(false));
                    state.insert("stock.picking", picking);
                }
                ("sale.order", "action_cancel") => {
                    let record = state.find_mut(model, *id).ok_or_else(|| {
                        ConnectorError::Rpc(format!("sale.order({id}) does not exist"))
                    })?;
                    if record.get("state").and_then(Value::as_str) == Some("done") {
                        return Err(ConnectorError::Rpc(
                            "cannot cancel a done sales order".into(),
                        ));
                    }
                    record.insert("state".into(), json!("cancel"));
                }
                ("stock.picking", "action_assign") => {
                    let record = state.find_mut(model, *id).ok_or_else(|| {
                        ConnectorError::Rpc(format!("stock.picking({id}) does not exist"))
                    })?;
                    if record.get("state").and_then(Value::as_str) == Some("confirmed") {
                        record.insert("state".into(), json!("assigned"));
                    }
                }
                ("stock.picking", "button_validate") => {
                    let requires_confirmation = state.validate_requires_confirmation;
                    let has_done_qty = state
                        .records
                        .get("stock.move")
                        .into_iter()
                        .flatten()
                        .filter(|m| m.get("picking_id").and_then(Value::as_i64) == Some(*id))
                        .any(|m| {
                            m.get("quantity_done")
                                .and_then(Value::as_f64)
                                .is_some_and(|q| q > 0.0)
                        });
                    let record = state.find_mut(model, *id).ok_or_else(|| {
                        ConnectorError::Rpc(format!("stock.picking({id}) does not exist"))
                    })?;
                    match record.get("state").and_then(Value::as_str) {
                        Some("done") => {}
                        Some("assigned") | Some("confirmed") => {
                            if requires_confirmation && !has_done_qty {
                                return Err(ConnectorError::Rpc(
                                    "wizard: immediate transfer confirmation required".into(),
                                ));
                            }
                            record.insert("state".into(), json!("done"));
                        }
                        other => {
                            return Err(ConnectorError::Rpc(format!(
                                "cannot validate picking in state {other:?}"
                            )));
                        }
                    }
                }
                ("stock.picking", "action_cancel") => {
                    let record = state.find_mut(model, *id).ok_or_else(|| {
                        ConnectorError::Rpc(format!("stock.picking({id}) does not exist"))
                    })?;
                    if record.get("state").and_then(Value::as_str) == Some("done") {
                        return Err(ConnectorError::Rpc("cannot cancel a done picking".into()));
                    }
                    record.insert("state".into(), json!("cancel"));
                }
                _ => {
                    // Unmodeled methods succeed silently, like a
                    // permissive server-side action.
                }
            }
        }
        Ok(Value::Bool(true))
    }
}
