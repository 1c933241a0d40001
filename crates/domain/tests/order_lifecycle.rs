//! Canonical-order lifecycle across the whole domain surface.

use chrono::Utc;
use std::collections::HashMap;

use common::{CountryCode, MarketplaceId, Money, OrderKey};
use domain::{
    sellable_qty, CanonicalOrder, ErpStatus, FiscalRegime, FulfillmentMode, MarketplaceStatus,
    MatchType, OrderLine, SkuResolver, TrackingPushState,
};

fn imported_order() -> CanonicalOrder {
    CanonicalOrder::imported(
        OrderKey::amazon("405-1234567-1234567"),
        MarketplaceId::new("A1PA6795UKMFR9"),
        CountryCode::new("DE"),
        FulfillmentMode::SellerFulfilled,
        Utc::now(),
        MarketplaceStatus::Unshipped,
    )
}

#[test]
fn full_lifecycle_forward_only() {
    let mut order = imported_order();

    // Items land after the lazy fetch.
    let mut line = OrderLine::reconcile("B42056R4-FBM", Some(2), None).unwrap();
    line.unit_price = Money::from_minor(2499);
    line.order_item_id = Some("item-1".into());
    order.attach_lines(vec![line]);
    assert!(order.needs_erp_creation());

    // ERP linkage is attached exactly once.
    order
        .attach_erp_order(42, order.erp_order_name(), ErpStatus::Confirmed)
        .unwrap();
    assert!(!order.needs_erp_creation());
    assert!(order.needs_tracking_push());

    // Tracking pushed; a later stale poll page changes nothing.
    order.set_tracking_push(TrackingPushState::Pushed).unwrap();
    let stale = imported_order();
    order.merge_import(&stale);
    assert_eq!(order.sync.erp_order_id, Some(42));
    assert_eq!(order.sync.tracking_push, TrackingPushState::Pushed);
    assert!(!order.needs_tracking_push());

    // Marketplace reports shipped; cancellation is no longer possible.
    let mut shipped = imported_order();
    shipped.status = MarketplaceStatus::Shipped;
    order.merge_import(&shipped);
    order.mark_canceled();
    assert_eq!(order.status, MarketplaceStatus::Shipped);
}

#[test]
fn resolver_and_stock_compose() {
    let resolver = SkuResolver::new(HashMap::from([(
        "B42056R4".to_string(),
        "B42056R4".to_string(),
    )]));

    let listed = "B42056R4-FBM";
    let resolution = resolver.resolve(listed);
    assert_eq!(resolution.match_type, MatchType::SuffixStripped);
    let canonical = resolution.canonical_sku.unwrap();

    // Safety buffer applies to the canonical SKU's free stock.
    assert_eq!(sellable_qty(50.0, 10.0), 40.0);
    assert_eq!(canonical, "B42056R4");
}

#[test]
fn regime_covers_all_destinations() {
    let home = CountryCode::new("BE");
    for (destination, expected) in [
        ("BE", FiscalRegime::Domestic(CountryCode::new("BE"))),
        ("DE", FiscalRegime::CrossBorder),
        ("CH", FiscalRegime::Export),
    ] {
        assert_eq!(
            FiscalRegime::for_shipment(&home, &CountryCode::new(destination)),
            expected,
            "destination {destination}"
        );
    }
}
