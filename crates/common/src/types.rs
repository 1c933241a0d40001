use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A sales channel the back office synchronizes with.
///
/// Wraps the channel slug (e.g. `"amazon"`) to prevent mixing it up
/// with other string identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    /// Creates a channel from its slug.
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into().to_lowercase())
    }

    /// The Amazon marketplace channel.
    pub fn amazon() -> Self {
        Self::new("amazon")
    }

    /// Returns the channel slug.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Channel {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Composite key identifying one marketplace order across the whole system.
///
/// Rendered as `channel:order_id` (e.g. `amazon:405-1234567-1234567`).
/// Every collection keyed by order uses this, so an order imported twice
/// from the same channel always lands on the same document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub channel: Channel,
    pub order_id: String,
}

impl OrderKey {
    /// Creates a key from a channel and the marketplace's order id.
    pub fn new(channel: Channel, order_id: impl Into<String>) -> Self {
        Self {
            channel,
            order_id: order_id.into(),
        }
    }

    /// Shorthand for an Amazon order key.
    pub fn amazon(order_id: impl Into<String>) -> Self {
        Self::new(Channel::amazon(), order_id)
    }
}

impl std::fmt::Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.channel, self.order_id)
    }
}

/// Error returned when parsing an [`OrderKey`] from its string form.
#[derive(Debug, Clone, Error)]
#[error("invalid order key '{0}': expected 'channel:order_id'")]
pub struct ParseOrderKeyError(pub String);

impl std::str::FromStr for OrderKey {
    type Err = ParseOrderKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((channel, order_id)) if !channel.is_empty() && !order_id.is_empty() => {
                Ok(Self::new(Channel::new(channel), order_id))
            }
            _ => Err(ParseOrderKeyError(s.to_string())),
        }
    }
}

/// Marketplace identifier assigned by the channel (e.g. Amazon's
/// `A1PA6795UKMFR9` for amazon.de).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketplaceId(String);

impl MarketplaceId {
    /// Creates a marketplace id from its raw channel-assigned value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MarketplaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MarketplaceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// ISO 3166-1 alpha-2 country code, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountryCode(String);

impl CountryCode {
    /// Creates a country code, normalizing to uppercase.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Returns the two-letter code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CountryCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_key_display_roundtrip() {
        let key = OrderKey::amazon("405-1234567-1234567");
        assert_eq!(key.to_string(), "amazon:405-1234567-1234567");

        let parsed: OrderKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn order_key_parse_rejects_missing_separator() {
        assert!("amazon".parse::<OrderKey>().is_err());
        assert!(":405".parse::<OrderKey>().is_err());
        assert!("amazon:".parse::<OrderKey>().is_err());
    }

    #[test]
    fn order_id_may_contain_colons() {
        let parsed: OrderKey = "ebay:12:34".parse().unwrap();
        assert_eq!(parsed.channel.as_str(), "ebay");
        assert_eq!(parsed.order_id, "12:34");
    }

    #[test]
    fn channel_is_lowercased() {
        assert_eq!(Channel::new("Amazon").as_str(), "amazon");
    }

    #[test]
    fn country_code_normalizes() {
        assert_eq!(CountryCode::new(" de ").as_str(), "DE");
    }

    #[test]
    fn order_key_serialization_roundtrip() {
        let key = OrderKey::amazon("028-1111111-2222222");
        let json = serde_json::to_string(&key).unwrap();
        let back: OrderKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
