//! Idempotent ERP order creation.
//!
//! For every eligible canonical order: find or create the ERP customer
//! and shipping contact, resolve line items to ERP products, route the
//! accounting journal and fiscal position by shipping jurisdiction, and
//! create (or find) the ERP sales order. Looking before creating is the
//! central invariant: calling this any number of times yields exactly
//! one ERP order.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use common::{CountryCode, OrderKey};
use connectors::erp::{model, relation_id, ErpClient};
use domain::{CanonicalOrder, ErpStatus, FiscalRegime, SkuResolver};
use store::OrderStore;

use crate::caches::ErpLookupCache;
use crate::error::{EngineError, Result};
use crate::outcome::{CreateBatchOutcome, CreateOutcome, ItemError};

/// Options for one creation call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    /// Resolve everything but do not write to the ERP.
    pub dry_run: bool,
    /// Confirm the created order (draft → sale) and reconcile the
    /// delivery's shipping contact.
    pub auto_confirm: bool,
}

/// Journal/fiscal routing configuration: regime → journal code and
/// fiscal position name in the ERP.
#[derive(Debug, Clone)]
pub struct JournalRouting {
    pub export_journal: String,
    pub domestic_journals: HashMap<String, String>,
    pub cross_border_journal: String,
    pub export_fiscal_position: String,
    pub cross_border_fiscal_position: String,
}

impl JournalRouting {
    /// Journal code for a regime; `None` when no domestic journal is
    /// configured for the country (falls back to the ERP default).
    pub fn journal_code(&self, regime: &FiscalRegime) -> Option<&str> {
        match regime {
            FiscalRegime::Export => Some(&self.export_journal),
            FiscalRegime::Domestic(country) => self
                .domestic_journals
                .get(country.as_str())
                .map(String::as_str),
            FiscalRegime::CrossBorder => Some(&self.cross_border_journal),
        }
    }

    /// Fiscal position name for a regime; domestic orders keep the
    /// partner's default position.
    pub fn fiscal_position_name(&self, regime: &FiscalRegime) -> Option<&str> {
        match regime {
            FiscalRegime::Export => Some(&self.export_fiscal_position),
            FiscalRegime::Domestic(_) => None,
            FiscalRegime::CrossBorder => Some(&self.cross_border_fiscal_position),
        }
    }
}

/// Creates ERP sales orders from canonical orders.
pub struct OrderCreator<S, E> {
    store: S,
    erp: E,
    resolver: Arc<SkuResolver>,
    routing: JournalRouting,
    ship_from: CountryCode,
    cache: Arc<ErpLookupCache>,
}

impl<S, E> OrderCreator<S, E>
where
    S: OrderStore,
    E: ErpClient,
{
    /// Creates the creator.
    pub fn new(
        store: S,
        erp: E,
        resolver: Arc<SkuResolver>,
        routing: JournalRouting,
        ship_from: CountryCode,
        cache: Arc<ErpLookupCache>,
    ) -> Self {
        Self {
            store,
            erp,
            resolver,
            routing,
            ship_from,
            cache,
        }
    }

    /// Runs creation for every eligible order, isolating failures per
    /// order: one order's error never aborts the batch.
    #[tracing::instrument(skip(self))]
    pub async fn create_pending(&self, options: CreateOptions) -> CreateBatchOutcome {
        let mut batch = CreateBatchOutcome::default();
        let eligible = match self.store.eligible_for_creation().await {
            Ok(eligible) => eligible,
            Err(err) => {
                batch.errors.push(ItemError::new("eligible_for_creation", err));
                return batch;
            }
        };

        for order in eligible {
            batch.checked += 1;
            let outcome = self.create_order(&order.key, options).await;
            if outcome.skipped {
                batch.skipped += 1;
            } else if outcome.success {
                batch.created += 1;
            } else {
                for message in &outcome.errors {
                    batch
                        .errors
                        .push(ItemError::new(order.key.to_string(), message));
                }
            }
        }
        info!(
            checked = batch.checked,
            created = batch.created,
            skipped = batch.skipped,
            errors = batch.errors.len(),
            "order creation batch finished"
        );
        batch
    }

    /// Creates (or finds) the ERP order for one canonical order.
    #[tracing::instrument(skip(self, options), fields(key = %key))]
    pub async fn create_order(&self, key: &OrderKey, options: CreateOptions) -> CreateOutcome {
        let mut outcome = CreateOutcome::default();

        let mut order = match self.store.get(key).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                outcome.errors.push(format!("unknown order {key}"));
                return outcome;
            }
            Err(err) => {
                outcome.errors.push(err.to_string());
                return outcome;
            }
        };

        // Already linked: nothing to do, safe to call again.
        if let Some(erp_id) = order.sync.erp_order_id {
            outcome.success = true;
            outcome.skipped = true;
            outcome.erp_order_id = Some(erp_id);
            return outcome;
        }
        if !order.needs_erp_creation() {
            outcome.skipped = true;
            return outcome;
        }

        match self.create_inner(&mut order, options, &mut outcome).await {
            Ok(()) => outcome,
            Err(err) => {
                outcome.success = false;
                outcome.errors.push(err.to_string());
                order.record_sync_error(err.to_string());
                if let Err(save_err) = self.store.save(&order).await {
                    outcome.errors.push(save_err.to_string());
                }
                outcome
            }
        }
    }

    async fn create_inner(
        &self,
        order: &mut CanonicalOrder,
        options: CreateOptions,
        outcome: &mut CreateOutcome,
    ) -> Result<()> {
        // Idempotency: look for an existing non-canceled ERP order first.
        if let Some((erp_id, erp_name, erp_status)) = self.find_existing(order).await? {
            debug!(erp_id, "existing ERP order found, attaching");
            order.attach_erp_order(erp_id, erp_name, erp_status)?;
            order.record_sync_ok();
            self.store.save(order).await?;
            outcome.success = true;
            outcome.skipped = true;
            outcome.erp_order_id = Some(erp_id);
            return Ok(());
        }

        // Resolve lines before touching partners so a hopeless order
        // creates no contact noise.
        let resolved_lines = self.resolve_lines(order, &mut outcome.warnings).await?;
        if resolved_lines.is_empty() {
            outcome
                .errors
                .push("no resolvable line items, order not created".to_string());
            order.record_sync_error("no resolvable line items");
            self.store.save(order).await?;
            return Ok(());
        }

        let regime = FiscalRegime::for_shipment(&self.ship_from, &order.country);
        let journal_id = self.resolve_journal(&regime, &mut outcome.warnings).await?;
        let fiscal_position_id = self
            .resolve_fiscal_position(&regime, &mut outcome.warnings)
            .await?;

        if options.dry_run {
            outcome.success = true;
            outcome
                .warnings
                .push(format!("dry run: would create order under regime {regime}"));
            return Ok(());
        }

        let (partner_id, shipping_partner_id) =
            self.resolve_partner(order, &mut outcome.warnings).await?;

        let order_lines: Vec<Value> = resolved_lines
            .iter()
            .map(|(product_id, line)| {
                json!([0, 0, {
                    "product_id": product_id,
                    "name": if line.title.is_empty() { line.sku.clone() } else { line.title.clone() },
                    "product_uom_qty": line.quantity,
                    "price_unit": line.unit_price.to_major(),
                    "discount": 0.0,
                }])
            })
            .collect();

        let erp_name = order.erp_order_name();
        let mut values = json!({
            "name": erp_name,
            "partner_id": partner_id,
            "partner_invoice_id": partner_id,
            "partner_shipping_id": shipping_partner_id,
            "client_order_ref": order.key.order_id,
            "origin": order.key.to_string(),
            "date_order": order.purchase_date.format("%Y-%m-%d %H:%M:%S").to_string(),
            "order_line": order_lines,
        });
        if let Some(journal_id) = journal_id {
            values["journal_invoice_id"] = json!(journal_id);
        }
        if let Some(fiscal_position_id) = fiscal_position_id {
            values["fiscal_position_id"] = json!(fiscal_position_id);
        }

        let erp_id = self.erp.create(model::SALE_ORDER, values).await?;
        metrics::counter!("erp_orders_created_total").increment(1);
        info!(erp_id, name = %erp_name, regime = %regime, "ERP order created");

        let mut status = ErpStatus::Draft;
        if options.auto_confirm {
            self.erp
                .execute(model::SALE_ORDER, "action_confirm", &[erp_id])
                .await?;
            status = ErpStatus::Confirmed;
            // Carrier labels key off the delivery record, so its
            // shipping contact has to match the order's.
            self.reconcile_delivery_contact(erp_id, shipping_partner_id)
                .await?;
        }

        order.attach_erp_order(erp_id, erp_name, status)?;
        order.record_sync_ok();
        self.store.save(order).await?;

        outcome.success = true;
        outcome.erp_order_id = Some(erp_id);
        Ok(())
    }

    /// Searches the ERP for an existing non-canceled order for this
    /// marketplace order: by structured reference, then by derived name.
    async fn find_existing(
        &self,
        order: &CanonicalOrder,
    ) -> Result<Option<(i64, String, ErpStatus)>> {
        for domain in [
            json!([
                ["client_order_ref", "=", order.key.order_id],
                ["state", "!=", "cancel"]
            ]),
            json!([
                ["name", "ilike", order.erp_order_name()],
                ["state", "!=", "cancel"]
            ]),
        ] {
            let rows = self
                .erp
                .search_read(model::SALE_ORDER, domain, &["name", "state"], Some(1))
                .await?;
            if let Some(row) = rows.first() {
                let id = row
                    .get("id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| EngineError::UnknownOrder(order.key.clone()))?;
                let name = row
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let state = row.get("state").and_then(Value::as_str).unwrap_or("draft");
                return Ok(Some((id, name, ErpStatus::from_erp_state(state))));
            }
        }
        Ok(None)
    }

    /// Resolves each line's SKU to an ERP product id; unresolved lines
    /// become warnings and are excluded.
    async fn resolve_lines<'a>(
        &self,
        order: &'a CanonicalOrder,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<(i64, &'a domain::OrderLine)>> {
        let mut resolved = Vec::new();
        for line in &order.lines {
            match self.find_product(&line.sku).await? {
                Some(product_id) => resolved.push((product_id, line)),
                None => {
                    warnings.push(format!("unresolved SKU {}, line excluded", line.sku));
                }
            }
        }
        Ok(resolved)
    }

    /// Locates the ERP product for a marketplace SKU: the resolver's
    /// canonical SKU first, then the raw variants as fallback probes.
    async fn find_product(&self, sku: &str) -> Result<Option<i64>> {
        let mut candidates = Vec::new();
        if let Some(canonical) = self.resolver.resolve(sku).canonical_sku {
            candidates.push(canonical);
        }
        for variant in self.resolver.sku_variants(sku) {
            if !candidates.contains(&variant) {
                candidates.push(variant);
            }
        }

        for code in candidates {
            if let Some(id) = self.cache.product(&code).await {
                return Ok(Some(id));
            }
            let rows = self
                .erp
                .search_read(
                    model::PRODUCT_PRODUCT,
                    json!([["default_code", "=", code]]),
                    &["default_code"],
                    Some(1),
                )
                .await?;
            if let Some(row) = rows.first() {
                if let Some(id) = row.get("id").and_then(Value::as_i64) {
                    self.cache.remember_product(code, id).await;
                    return Ok(Some(id));
                }
            }
        }
        Ok(None)
    }

    /// Finds or creates the customer and shipping contact.
    ///
    /// Search-then-create, never blind-create: repeated orders from the
    /// same buyer reuse one ERP contact.
    async fn resolve_partner(
        &self,
        order: &CanonicalOrder,
        warnings: &mut Vec<String>,
    ) -> Result<(i64, i64)> {
        let display_name = order.customer_display_name();
        let zip = order.ship_to.postal_code.clone().unwrap_or_default();
        let cache_key = format!("{display_name}|{zip}");

        let partner_id = match self.cache.partner(&cache_key).await {
            Some(id) => id,
            None => {
                let mut domain = vec![json!(["name", "=", display_name])];
                if !zip.is_empty() {
                    domain.push(json!(["zip", "=", zip]));
                }
                let rows = self
                    .erp
                    .search_read(model::RES_PARTNER, Value::Array(domain), &["name"], Some(1))
                    .await?;
                let id = match rows.first().and_then(|r| r.get("id")).and_then(Value::as_i64) {
                    Some(id) => id,
                    None => self.create_partner(order, &display_name, warnings).await?,
                };
                self.cache.remember_partner(cache_key, id).await;
                id
            }
        };

        // Business orders carry VAT/company data the channel only
        // reports per order; keep the contact up to date.
        if order.is_business_order {
            let mut updates = serde_json::Map::new();
            if let Some(vat) = &order.buyer.vat_number {
                updates.insert("vat".into(), json!(vat));
            }
            if let Some(company) = &order.buyer.company_name {
                updates.insert("company_name".into(), json!(company));
            }
            if !updates.is_empty() {
                self.erp
                    .write(model::RES_PARTNER, &[partner_id], Value::Object(updates))
                    .await?;
            }
        }

        let shipping_id = self
            .resolve_shipping_contact(order, partner_id, &display_name)
            .await?;
        Ok((partner_id, shipping_id))
    }

    async fn create_partner(
        &self,
        order: &CanonicalOrder,
        display_name: &str,
        warnings: &mut Vec<String>,
    ) -> Result<i64> {
        let mut values = json!({
            "name": display_name,
            "is_company": order.is_business_order,
        });
        if let Some(email) = &order.buyer.email {
            values["email"] = json!(email);
        }
        if let Some(street) = &order.ship_to.street {
            values["street"] = json!(street);
        }
        if let Some(street2) = &order.ship_to.street2 {
            values["street2"] = json!(street2);
        }
        if let Some(city) = &order.ship_to.city {
            values["city"] = json!(city);
        }
        if let Some(zip) = &order.ship_to.postal_code {
            values["zip"] = json!(zip);
        }
        match self.resolve_country(&order.country).await? {
            Some(country_id) => values["country_id"] = json!(country_id),
            None => warnings.push(format!("unknown country {}", order.country)),
        }
        let id = self.erp.create(model::RES_PARTNER, values).await?;
        debug!(partner_id = id, name = display_name, "partner created");
        Ok(id)
    }

    /// A distinct delivery contact is only needed when the parcel goes
    /// to a different name than the customer record.
    async fn resolve_shipping_contact(
        &self,
        order: &CanonicalOrder,
        partner_id: i64,
        display_name: &str,
    ) -> Result<i64> {
        let ship_name = match &order.ship_to.name {
            Some(name) if !name.trim().is_empty() && name.trim() != display_name => {
                name.trim().to_string()
            }
            _ => return Ok(partner_id),
        };

        let rows = self
            .erp
            .search_read(
                model::RES_PARTNER,
                json!([
                    ["name", "=", ship_name],
                    ["parent_id", "=", partner_id],
                    ["type", "=", "delivery"]
                ]),
                &["name"],
                Some(1),
            )
            .await?;
        if let Some(id) = rows.first().and_then(|r| r.get("id")).and_then(Value::as_i64) {
            return Ok(id);
        }

        let mut values = json!({
            "name": ship_name,
            "parent_id": partner_id,
            "type": "delivery",
        });
        if let Some(street) = &order.ship_to.street {
            values["street"] = json!(street);
        }
        if let Some(city) = &order.ship_to.city {
            values["city"] = json!(city);
        }
        if let Some(zip) = &order.ship_to.postal_code {
            values["zip"] = json!(zip);
        }
        if let Some(country_id) = self.resolve_country(&order.country).await? {
            values["country_id"] = json!(country_id);
        }
        Ok(self.erp.create(model::RES_PARTNER, values).await?)
    }

    async fn resolve_country(&self, country: &CountryCode) -> Result<Option<i64>> {
        if let Some(id) = self.cache.country(country.as_str()).await {
            return Ok(Some(id));
        }
        let rows = self
            .erp
            .search_read(
                model::RES_COUNTRY,
                json!([["code", "=", country.as_str()]]),
                &["code"],
                Some(1),
            )
            .await?;
        let id = rows.first().and_then(|r| r.get("id")).and_then(Value::as_i64);
        if let Some(id) = id {
            self.cache.remember_country(country.as_str(), id).await;
        }
        Ok(id)
    }

    async fn resolve_journal(
        &self,
        regime: &FiscalRegime,
        warnings: &mut Vec<String>,
    ) -> Result<Option<i64>> {
        let Some(code) = self.routing.journal_code(regime) else {
            return Ok(None);
        };
        if let Some(id) = self.cache.journal(code).await {
            return Ok(Some(id));
        }
        let rows = self
            .erp
            .search_read(
                model::ACCOUNT_JOURNAL,
                json!([["code", "=", code]]),
                &["code"],
                Some(1),
            )
            .await?;
        match rows.first().and_then(|r| r.get("id")).and_then(Value::as_i64) {
            Some(id) => {
                self.cache.remember_journal(code, id).await;
                Ok(Some(id))
            }
            None => {
                warnings.push(format!("journal {code} not found, using ERP default"));
                Ok(None)
            }
        }
    }

    async fn resolve_fiscal_position(
        &self,
        regime: &FiscalRegime,
        warnings: &mut Vec<String>,
    ) -> Result<Option<i64>> {
        let Some(name) = self.routing.fiscal_position_name(regime) else {
            return Ok(None);
        };
        if let Some(id) = self.cache.fiscal_position(name).await {
            return Ok(Some(id));
        }
        let rows = self
            .erp
            .search_read(
                model::FISCAL_POSITION,
                json!([["name", "ilike", name]]),
                &["name"],
                Some(1),
            )
            .await?;
        match rows.first().and_then(|r| r.get("id")).and_then(Value::as_i64) {
            Some(id) => {
                self.cache.remember_fiscal_position(name, id).await;
                Ok(Some(id))
            }
            None => {
                warnings.push(format!("fiscal position '{name}' not found"));
                Ok(None)
            }
        }
    }

    /// Aligns the delivery's shipping contact with the order's.
    async fn reconcile_delivery_contact(&self, erp_order_id: i64, shipping_id: i64) -> Result<()> {
        let pickings = self
            .erp
            .search_read(
                model::STOCK_PICKING,
                json!([["sale_id", "=", erp_order_id]]),
                &["partner_id"],
                None,
            )
            .await?;
        for picking in &pickings {
            let picking_id = picking.get("id").and_then(Value::as_i64);
            let current = relation_id(picking.get("partner_id"));
            if let Some(picking_id) = picking_id {
                if current != Some(shipping_id) {
                    warn!(picking_id, shipping_id, "reconciling delivery shipping contact");
                    self.erp
                        .write(
                            model::STOCK_PICKING,
                            &[picking_id],
                            json!({"partner_id": shipping_id}),
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }
}
