//! Marketplace SKU → canonical ERP SKU resolution.
//!
//! Seller SKUs on the channel accumulate decorations: fulfillment-mode
//! suffixes (`-FBM`, `-FBA`), pack-size variants (`-2P`, `-5P`, ...) and
//! the return/replacement wrapper the channel generates for customer
//! returns (`amzn.gr.<base>-<22-char token>`). Resolution peels these
//! off in a fixed order and consults the override table for the final
//! word. The rules are heuristic and channel-specific; the test tables
//! below are the living record of the naming conventions in use.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Literal prefix of return/replacement SKUs generated by the channel.
const RETURN_SKU_PREFIX: &str = "amzn.gr.";

/// Fulfillment-mode suffixes appended to catalog SKUs per listing.
const FULFILLMENT_SUFFIXES: &[&str] = &["-FBM", "-FBA"];

/// Known packaging-variant suffixes (multi-pack listings).
const PACK_SUFFIXES: &[&str] = &["-2P", "-3P", "-4P", "-5P", "-10P"];

/// How a SKU was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// The SKU itself is in the override table.
    Exact,
    /// Matched after unwrapping the return/replacement pattern.
    ReturnPattern,
    /// Matched after stripping one or more known suffixes.
    SuffixStripped,
    /// No candidate found in the override table.
    Unresolved,
}

/// Result of a resolution attempt.
///
/// `canonical_sku == None` is a reportable data-quality condition, never
/// a fatal error: callers continue in degraded mode and surface the SKU
/// through the unresolved-SKU channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub canonical_sku: Option<String>,
    pub match_type: MatchType,
}

impl Resolution {
    fn unresolved() -> Self {
        Self {
            canonical_sku: None,
            match_type: MatchType::Unresolved,
        }
    }
}

/// Deterministic SKU resolver over a loaded override table.
///
/// The table maps marketplace SKUs (and canonical SKUs to themselves) to
/// ERP product codes. It is loaded once per process and read-only during
/// a cycle, so resolution is a pure function of the SKU and the table.
pub struct SkuResolver {
    overrides: HashMap<String, String>,
    return_pattern: Regex,
}

impl SkuResolver {
    /// Builds a resolver over an override table.
    pub fn new(overrides: HashMap<String, String>) -> Self {
        Self {
            overrides,
            // base, then one hyphen, then the 22-char random token.
            return_pattern: Regex::new(r"^(.+)-([A-Za-z0-9]{22})$")
                .expect("return SKU pattern is a valid regex"),
        }
    }

    /// Resolves a marketplace SKU to a canonical ERP SKU.
    ///
    /// Candidates are probed against the override table in order: the
    /// original SKU, the unwrapped return base, and each suffix-stripped
    /// form. First hit wins.
    pub fn resolve(&self, marketplace_sku: &str) -> Resolution {
        for (candidate, match_type) in self.candidates(marketplace_sku) {
            if let Some(canonical) = self.overrides.get(&candidate) {
                return Resolution {
                    canonical_sku: Some(canonical.clone()),
                    match_type,
                };
            }
        }
        Resolution::unresolved()
    }

    /// The ordered candidate list for a SKU, for callers that probe an
    /// external product directory directly instead of the table.
    pub fn sku_variants(&self, marketplace_sku: &str) -> Vec<String> {
        self.candidates(marketplace_sku)
            .into_iter()
            .map(|(candidate, _)| candidate)
            .collect()
    }

    fn candidates(&self, sku: &str) -> Vec<(String, MatchType)> {
        let sku = sku.trim();
        let mut out: Vec<(String, MatchType)> = Vec::new();
        let mut push = |candidate: String, match_type: MatchType| {
            if !candidate.is_empty() && !out.iter().any(|(c, _)| c == &candidate) {
                out.push((candidate, match_type));
            }
        };

        push(sku.to_string(), MatchType::Exact);

        // 1. Return/replacement wrapper: fixed prefix + base + random token.
        let base = match sku.strip_prefix(RETURN_SKU_PREFIX) {
            Some(rest) => match self.return_pattern.captures(rest) {
                Some(caps) => {
                    let base = caps.get(1).map(|m| m.as_str().to_string());
                    if let Some(base) = &base {
                        push(base.clone(), MatchType::ReturnPattern);
                    }
                    base.unwrap_or_else(|| sku.to_string())
                }
                None => sku.to_string(),
            },
            None => sku.to_string(),
        };

        // 2. Ordered suffix stripping on the base identifier.
        let match_type = if base != sku {
            // Everything derived from a return base keeps that provenance.
            MatchType::ReturnPattern
        } else {
            MatchType::SuffixStripped
        };
        let mut stripped = base.clone();
        for suffix in FULFILLMENT_SUFFIXES {
            if let Some(s) = strip_suffix_ci(&stripped, suffix) {
                stripped = s;
                push(stripped.clone(), match_type);
                break;
            }
        }
        for suffix in PACK_SUFFIXES {
            if let Some(s) = strip_suffix_ci(&stripped, suffix) {
                stripped = s;
                push(stripped.clone(), match_type);
                break;
            }
        }

        out
    }
}

fn strip_suffix_ci(s: &str, suffix: &str) -> Option<String> {
    if s.len() > suffix.len() && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix) {
        Some(s[..s.len() - suffix.len()].to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "hT5k2mQ9xZ1aB3cD4eF6gH"; // 22 chars

    fn resolver() -> SkuResolver {
        let mut table = HashMap::new();
        // Catalog SKUs map to themselves; true overrides map across.
        for sku in ["B42056R4", "B43079", "AC401", "X19006"] {
            table.insert(sku.to_string(), sku.to_string());
        }
        table.insert("OLD-LISTING".to_string(), "B43079".to_string());
        SkuResolver::new(table)
    }

    #[test]
    fn exact_match_wins() {
        let r = resolver().resolve("B42056R4");
        assert_eq!(r.canonical_sku.as_deref(), Some("B42056R4"));
        assert_eq!(r.match_type, MatchType::Exact);
    }

    #[test]
    fn override_entry_maps_across() {
        let r = resolver().resolve("OLD-LISTING");
        assert_eq!(r.canonical_sku.as_deref(), Some("B43079"));
        assert_eq!(r.match_type, MatchType::Exact);
    }

    #[test]
    fn fulfillment_suffix_is_stripped() {
        let r = resolver().resolve("B42056R4-FBM");
        assert_eq!(r.canonical_sku.as_deref(), Some("B42056R4"));
        assert_eq!(r.match_type, MatchType::SuffixStripped);

        let r = resolver().resolve("AC401-FBA");
        assert_eq!(r.canonical_sku.as_deref(), Some("AC401"));
    }

    #[test]
    fn pack_suffix_is_stripped() {
        let r = resolver().resolve("X19006-2P");
        assert_eq!(r.canonical_sku.as_deref(), Some("X19006"));
        assert_eq!(r.match_type, MatchType::SuffixStripped);
    }

    #[test]
    fn fulfillment_then_pack_suffix() {
        let r = resolver().resolve("X19006-2P-FBM");
        assert_eq!(r.canonical_sku.as_deref(), Some("X19006"));
    }

    #[test]
    fn return_pattern_unwraps_to_base() {
        let sku = format!("amzn.gr.B42056R4-{TOKEN}");
        let r = resolver().resolve(&sku);
        assert_eq!(r.canonical_sku.as_deref(), Some("B42056R4"));
        assert_eq!(r.match_type, MatchType::ReturnPattern);
    }

    #[test]
    fn return_pattern_with_fulfillment_suffix() {
        // prefix.BASE-FBM-<22-char token> resolves to BASE.
        let sku = format!("amzn.gr.B42056R4-FBM-{TOKEN}");
        let r = resolver().resolve(&sku);
        assert_eq!(r.canonical_sku.as_deref(), Some("B42056R4"));
        assert_eq!(r.match_type, MatchType::ReturnPattern);
    }

    #[test]
    fn resolution_is_deterministic() {
        let r = resolver();
        let a = r.resolve("B42056R4-FBM");
        let b = r.resolve("B42056R4-FBM");
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_sku_is_unresolved_not_fatal() {
        let r = resolver().resolve("NOPE-123");
        assert_eq!(r.canonical_sku, None);
        assert_eq!(r.match_type, MatchType::Unresolved);
    }

    // Known negatives: shapes the rules must NOT mangle.
    #[test]
    fn negative_table() {
        let r = resolver();
        // Short token: not a return SKU, and not in the table.
        assert_eq!(
            r.resolve("amzn.gr.B42056R4-abc").match_type,
            MatchType::Unresolved
        );
        // Suffix-like infix must not be stripped.
        assert_eq!(r.resolve("AC-FBM-401").match_type, MatchType::Unresolved);
        // A bare suffix is not a SKU.
        assert_eq!(r.resolve("-FBM").match_type, MatchType::Unresolved);
    }

    #[test]
    fn variants_expose_candidate_list() {
        let r = resolver();
        let sku = format!("amzn.gr.B42056R4-FBM-{TOKEN}");
        let variants = r.sku_variants(&sku);
        assert_eq!(variants[0], sku);
        assert!(variants.contains(&"B42056R4-FBM".to_string()));
        assert!(variants.contains(&"B42056R4".to_string()));
    }

    #[test]
    fn variants_for_plain_sku() {
        let r = resolver();
        assert_eq!(
            r.sku_variants("B42056R4-FBM"),
            vec!["B42056R4-FBM".to_string(), "B42056R4".to_string()]
        );
    }
}
