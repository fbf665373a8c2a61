//! Derived price, trend and alert types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Price shown for one symbol: a single value or a buy/sell pair, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayedPrice {
    Single { single: Decimal },
    BuySell { buy: Decimal, sell: Decimal },
}

impl DisplayedPrice {
    /// The value used for trend comparison: `sell` when split, else `single`.
    pub fn reference_price(&self) -> Decimal {
        match self {
            DisplayedPrice::Single { single } => *single,
            DisplayedPrice::BuySell { sell, .. } => *sell,
        }
    }

    pub fn single(&self) -> Option<Decimal> {
        match self {
            DisplayedPrice::Single { single } => Some(*single),
            DisplayedPrice::BuySell { .. } => None,
        }
    }

    pub fn buy(&self) -> Option<Decimal> {
        match self {
            DisplayedPrice::BuySell { buy, .. } => Some(*buy),
            DisplayedPrice::Single { .. } => None,
        }
    }

    pub fn sell(&self) -> Option<Decimal> {
        match self {
            DisplayedPrice::BuySell { sell, .. } => Some(*sell),
            DisplayedPrice::Single { .. } => None,
        }
    }
}

/// Persisted visual trend marker for a symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Highlight {
    #[serde(rename = "up")]
    Up,
    #[serde(rename = "down")]
    Down,
    #[default]
    #[serde(rename = "")]
    None,
}

impl Highlight {
    /// Returns the wire-format marker (`"up"`, `"down"` or `""`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Highlight::Up => "up",
            Highlight::Down => "down",
            Highlight::None => "",
        }
    }
}

/// Last observed reference price and highlight for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendState {
    pub last_reference_price: Decimal,
    #[serde(default)]
    pub highlight: Highlight,
}

/// A detected move in a symbol's reference price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChangeEvent {
    pub symbol: String,
    pub trend: Highlight,
    pub absolute_delta: Decimal,
    /// Percent move relative to the previous price, rounded to 2 dp.
    pub percent_delta: Decimal,
    pub created_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn reference_price_prefers_sell() {
        let split = DisplayedPrice::BuySell {
            buy: dec!(100),
            sell: dec!(105),
        };
        assert_eq!(split.reference_price(), dec!(105));
        assert_eq!(split.single(), None);

        let single = DisplayedPrice::Single { single: dec!(42) };
        assert_eq!(single.reference_price(), dec!(42));
        assert_eq!(single.buy(), None);
        assert_eq!(single.sell(), None);
    }

    #[test]
    fn highlight_serializes_to_markers() {
        assert_eq!(serde_json::to_string(&Highlight::Up).unwrap(), r#""up""#);
        assert_eq!(serde_json::to_string(&Highlight::None).unwrap(), r#""""#);
        let parsed: Highlight = serde_json::from_str(r#""down""#).unwrap();
        assert_eq!(parsed, Highlight::Down);
    }

    #[test]
    fn trend_state_defaults_highlight() {
        let state: TrendState =
            serde_json::from_str(r#"{"last_reference_price": "100"}"#).unwrap();
        assert_eq!(state.highlight, Highlight::None);
        assert_eq!(state.last_reference_price, dec!(100));
    }
}
