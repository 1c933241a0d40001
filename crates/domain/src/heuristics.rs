//! Named string heuristics forced on us by the marketplace API.
//!
//! The channel offers no typed way to distinguish promotion pseudo-items
//! from real lines, no machine-readable "already shipped" error code on
//! every path, and free-text carrier names on ERP deliveries. Each
//! heuristic lives here as a named predicate with a test table of known
//! positives and negatives; whether they under- or over-filter in
//! production is tracked by extending those tables, not by rewriting.

use common::Money;

/// Maximum SKU length a promotion pseudo-item uses.
const PSEUDO_ITEM_MAX_SKU_LEN: usize = 10;

/// True for promotion/discount pseudo-items the channel injects into
/// order-item listings.
///
/// Heuristic: a short, purely alphanumeric code (no `-`, `.` or `_`
/// separators real catalog SKUs carry) with a non-positive price.
pub fn is_pseudo_item(sku: &str, unit_price: Money) -> bool {
    let sku = sku.trim();
    !sku.is_empty()
        && sku.len() <= PSEUDO_ITEM_MAX_SKU_LEN
        && sku.chars().all(|c| c.is_ascii_alphanumeric())
        && !unit_price.is_positive()
}

/// Error-message family meaning "this order is already shipped/fulfilled
/// on the marketplace side".
///
/// The marketplace is the source of truth and a fulfilled order can
/// never be unfulfilled, so callers treat these as a successful no-op.
const ALREADY_SHIPPED_NEEDLES: &[&str] = &[
    "already been shipped",
    "already shipped",
    "already been confirmed",
    "already confirmed",
    "is fulfilled",
    "invalidorderstate",
];

/// True if a shipment-confirmation failure message belongs to the
/// already-shipped family.
pub fn is_already_shipped_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    ALREADY_SHIPPED_NEEDLES
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Fixed marketplace carrier-code vocabulary, mapped from the ERP's
/// free-text carrier by substring matching. Unknown carriers fall back
/// to the generic `"Other"` code.
const CARRIER_TABLE: &[(&str, &str)] = &[
    ("dhl", "DHL"),
    ("ups", "UPS"),
    ("dpd", "DPD"),
    ("gls", "GLS"),
    ("bpost", "Bpost"),
    ("postnl", "PostNL"),
    ("fedex", "FedEx"),
    ("colissimo", "Colissimo"),
    ("mondial", "Mondial Relay"),
    ("hermes", "Hermes"),
];

/// Default carrier code when nothing matches.
pub const CARRIER_OTHER: &str = "Other";

/// Maps an ERP free-text carrier name to the marketplace carrier code.
pub fn marketplace_carrier_code(erp_carrier: &str) -> &'static str {
    let lower = erp_carrier.to_lowercase();
    CARRIER_TABLE
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, code)| *code)
        .unwrap_or(CARRIER_OTHER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_item_positives() {
        for (sku, price) in [
            ("PROMO1", 0),
            ("DISC10", -250),
            ("X1", 0),
            ("ABC123", -1),
        ] {
            assert!(
                is_pseudo_item(sku, Money::from_minor(price)),
                "expected pseudo-item: {sku} @ {price}"
            );
        }
    }

    #[test]
    fn pseudo_item_negatives() {
        for (sku, price) in [
            // Real catalog SKUs carry separators or length.
            ("B42056R4-FBM", 0),
            ("AC401.2", -100),
            ("VERYLONGSKU", 0),
            // Positive price means a real (if oddly coded) line.
            ("PROMO1", 100),
            // Empty SKU is a data-quality issue, not a promotion.
            ("", 0),
        ] {
            assert!(
                !is_pseudo_item(sku, Money::from_minor(price)),
                "expected real item: {sku:?} @ {price}"
            );
        }
    }

    #[test]
    fn already_shipped_positives() {
        for msg in [
            "The package has already been shipped",
            "Order already shipped on 2024-03-01",
            "Shipment already confirmed",
            "InvalidOrderState: order is fulfilled",
        ] {
            assert!(is_already_shipped_error(msg), "{msg}");
        }
    }

    #[test]
    fn already_shipped_negatives() {
        for msg in [
            "Rate limit exceeded",
            "Invalid tracking number",
            "Order not found",
            "Internal server error",
        ] {
            assert!(!is_already_shipped_error(msg), "{msg}");
        }
    }

    #[test]
    fn carrier_mapping_table() {
        assert_eq!(marketplace_carrier_code("DHL Express"), "DHL");
        assert_eq!(marketplace_carrier_code("bpost standard"), "Bpost");
        assert_eq!(marketplace_carrier_code("PostNL Pakket"), "PostNL");
        assert_eq!(marketplace_carrier_code("Mondial Relay point"), "Mondial Relay");
        assert_eq!(marketplace_carrier_code("Some Local Courier"), "Other");
        assert_eq!(marketplace_carrier_code(""), "Other");
    }
}
