//! Per-symbol board settings: display label and price adjustments.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-symbol display and pricing settings authored on the settings screen.
///
/// Percentages are expressed in whole percent (`5` means +5%). Values are
/// absolute offsets in the feed's unit. Missing fields default to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolConfig {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub show_buy_sell: bool,
    #[serde(default)]
    pub adjustment_percent: Decimal,
    #[serde(default)]
    pub adjustment_value: Decimal,
    #[serde(default)]
    pub buy_adjustment_percent: Decimal,
    #[serde(default)]
    pub buy_adjustment_value: Decimal,
    #[serde(default)]
    pub sell_adjustment_percent: Decimal,
    #[serde(default)]
    pub sell_adjustment_value: Decimal,
}

impl SymbolConfig {
    /// Creates a config for `symbol` with no adjustment and a single price.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Label shown on the board, falling back to the symbol code.
    pub fn label<'a>(&'a self, feed_name: &'a str) -> &'a str {
        if !self.name.is_empty() {
            &self.name
        } else if !feed_name.is_empty() {
            feed_name
        } else {
            &self.symbol
        }
    }
}
