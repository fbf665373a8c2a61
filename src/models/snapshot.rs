//! Feed snapshot types and wire-format parsing.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::Result;

/// Feed category a symbol is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Metal,
    Currency,
    Crypto,
}

impl Category {
    /// Returns the wire-format key for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Metal => "metal",
            Category::Currency => "currency",
            Category::Crypto => "crypto",
        }
    }
}

/// One priced symbol inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub symbol: String,
    pub name: String,
    pub raw_price: Decimal,
    pub unit: String,
    pub category: Category,
}

/// All raw prices for every tracked symbol at one point in time.
///
/// Snapshots are replaced wholesale, never edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub items: Vec<FeedItem>,
}

impl FeedSnapshot {
    /// Looks up a symbol regardless of its category.
    pub fn get(&self, symbol: &str) -> Option<&FeedItem> {
        self.items.iter().find(|item| item.symbol == symbol)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Feed response body as served by the upstream endpoint.
#[derive(Debug, Deserialize)]
struct FeedWire {
    #[serde(default)]
    metal: Vec<FeedItemWire>,
    #[serde(default)]
    currency: Vec<FeedItemWire>,
    #[serde(default)]
    crypto: Vec<FeedItemWire>,
}

#[derive(Debug, Deserialize)]
struct FeedItemWire {
    symbol: String,
    #[serde(default)]
    name: String,
    #[serde(deserialize_with = "price_from_wire")]
    price: Decimal,
    #[serde(default)]
    unit: String,
}

/// Accepts a JSON number or a string such as `"1,250,000"`.
fn price_from_wire<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let text = match &value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.replace(',', "").trim().to_string(),
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected price as number or string, got {other}"
            )));
        }
    };
    text.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| serde::de::Error::custom(format!("invalid price {text:?}: {e}")))
}

/// Parses a raw feed body into a [`FeedSnapshot`].
///
/// Categories missing from the body are treated as empty. A body with no
/// items at all is rejected, since replacing a good cache with an empty
/// board would blank every price.
///
/// # Errors
///
/// Returns [`PriceBoardError::Json`](crate::PriceBoardError::Json) if the body
/// is not valid JSON of the expected shape, or
/// [`PriceBoardError::MalformedFeed`](crate::PriceBoardError::MalformedFeed)
/// if it contains no priced symbols.
pub fn parse_snapshot(body: &str) -> Result<FeedSnapshot> {
    let wire: FeedWire = serde_json::from_str(body)?;

    let mut items = Vec::with_capacity(wire.metal.len() + wire.currency.len() + wire.crypto.len());
    for (category, entries) in [
        (Category::Metal, wire.metal),
        (Category::Currency, wire.currency),
        (Category::Crypto, wire.crypto),
    ] {
        items.extend(entries.into_iter().map(|entry| FeedItem {
            symbol: entry.symbol,
            name: entry.name,
            raw_price: entry.price,
            unit: entry.unit,
            category,
        }));
    }

    if items.is_empty() {
        return Err(crate::PriceBoardError::MalformedFeed(
            "feed contained no priced symbols".to_string(),
        ));
    }

    Ok(FeedSnapshot { items })
}
