//! Journal / fiscal-regime routing.
//!
//! Which accounting journal and fiscal position an ERP order gets is a
//! function of the ship-from and ship-to jurisdictions alone. This is a
//! decision table, not free-form logic: destination outside the home
//! trading bloc exports, same-country stays domestic, everything else
//! goes through the consolidated cross-border regime.

use common::CountryCode;
use serde::{Deserialize, Serialize};

/// EU member states (the home trading bloc of the deployment).
pub const EU_BLOC: &[&str] = &[
    "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE", "GR", "HU", "IE", "IT",
    "LV", "LT", "LU", "MT", "NL", "PL", "PT", "RO", "SK", "SI", "ES", "SE",
];

/// Tax/accounting routing regime for one order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "regime", content = "country")]
pub enum FiscalRegime {
    /// Destination outside the home bloc.
    Export,
    /// Ship-from and ship-to are the same country.
    Domestic(CountryCode),
    /// Cross-border within the bloc, consolidated (one-stop-shop style).
    CrossBorder,
}

impl FiscalRegime {
    /// Applies the decision table.
    pub fn for_shipment(ship_from: &CountryCode, ship_to: &CountryCode) -> FiscalRegime {
        if !in_bloc(ship_to) {
            FiscalRegime::Export
        } else if ship_from == ship_to {
            FiscalRegime::Domestic(ship_to.clone())
        } else {
            FiscalRegime::CrossBorder
        }
    }
}

fn in_bloc(country: &CountryCode) -> bool {
    EU_BLOC.contains(&country.as_str())
}

impl std::fmt::Display for FiscalRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FiscalRegime::Export => write!(f, "export"),
            FiscalRegime::Domestic(c) => write!(f, "domestic-{c}"),
            FiscalRegime::CrossBorder => write!(f, "cross-border"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc(s: &str) -> CountryCode {
        CountryCode::new(s)
    }

    #[test]
    fn outside_bloc_is_export() {
        assert_eq!(
            FiscalRegime::for_shipment(&cc("BE"), &cc("GB")),
            FiscalRegime::Export
        );
        assert_eq!(
            FiscalRegime::for_shipment(&cc("BE"), &cc("CH")),
            FiscalRegime::Export
        );
        assert_eq!(
            FiscalRegime::for_shipment(&cc("BE"), &cc("US")),
            FiscalRegime::Export
        );
    }

    #[test]
    fn same_country_is_domestic() {
        assert_eq!(
            FiscalRegime::for_shipment(&cc("BE"), &cc("BE")),
            FiscalRegime::Domestic(cc("BE"))
        );
        assert_eq!(
            FiscalRegime::for_shipment(&cc("DE"), &cc("DE")),
            FiscalRegime::Domestic(cc("DE"))
        );
    }

    #[test]
    fn intra_bloc_cross_border_is_consolidated() {
        assert_eq!(
            FiscalRegime::for_shipment(&cc("BE"), &cc("DE")),
            FiscalRegime::CrossBorder
        );
        assert_eq!(
            FiscalRegime::for_shipment(&cc("BE"), &cc("FR")),
            FiscalRegime::CrossBorder
        );
    }

    #[test]
    fn export_beats_domestic_for_non_bloc_home() {
        // A non-bloc destination is export even if it equals ship-from.
        assert_eq!(
            FiscalRegime::for_shipment(&cc("GB"), &cc("GB")),
            FiscalRegime::Export
        );
    }
}
