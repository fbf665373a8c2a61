//! Price adjustment from raw feed values to displayed prices.
//!
//! Adjustments are applied as `raw * (1 + percent / 100) + value`. No
//! ordering is enforced between buy and sell, and negative results are
//! passed through unchanged. A result that does not fit in a [`Decimal`]
//! yields `None`.

use rust_decimal::Decimal;

use crate::models::price::DisplayedPrice;
use crate::models::symbol::SymbolConfig;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Applies one percent-plus-offset adjustment to a raw price.
///
/// Returns `None` if any step overflows.
pub fn apply(raw: Decimal, percent: Decimal, value: Decimal) -> Option<Decimal> {
    let factor = Decimal::ONE.checked_add(percent.checked_div(HUNDRED)?)?;
    let adjusted = raw.checked_mul(factor)?.checked_add(value)?;
    Some(adjusted.normalize())
}

/// Derives the displayed price(s) for a symbol from its raw feed price.
///
/// Returns `None` when the adjusted price overflows.
pub fn adjust(raw: Decimal, config: &SymbolConfig) -> Option<DisplayedPrice> {
    let price = if config.show_buy_sell {
        DisplayedPrice::BuySell {
            buy: apply(
                raw,
                config.buy_adjustment_percent,
                config.buy_adjustment_value,
            )?,
            sell: apply(
                raw,
                config.sell_adjustment_percent,
                config.sell_adjustment_value,
            )?,
        }
    } else {
        DisplayedPrice::Single {
            single: apply(raw, config.adjustment_percent, config.adjustment_value)?,
        }
    };
    Some(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn single_price_with_percent_and_value() {
        let config = SymbolConfig {
            adjustment_percent: dec!(5),
            adjustment_value: dec!(2000),
            ..SymbolConfig::new("GOLD18")
        };

        let price = adjust(dec!(1000000), &config).unwrap();
        assert_eq!(price, DisplayedPrice::Single { single: dec!(1052000) });
        assert_eq!(price.reference_price(), dec!(1052000));
    }

    #[test]
    fn buy_sell_split() {
        let config = SymbolConfig {
            show_buy_sell: true,
            sell_adjustment_percent: dec!(3),
            buy_adjustment_percent: dec!(1),
            ..SymbolConfig::new("GOLD18")
        };

        let price = adjust(dec!(1000000), &config).unwrap();
        assert_eq!(price.sell(), Some(dec!(1030000)));
        assert_eq!(price.buy(), Some(dec!(1010000)));
        assert_eq!(price.single(), None);
        assert_eq!(price.reference_price(), dec!(1030000));
    }

    #[test]
    fn split_ignores_single_adjustment() {
        let config = SymbolConfig {
            show_buy_sell: true,
            adjustment_percent: dec!(50),
            adjustment_value: dec!(999),
            ..SymbolConfig::new("USD")
        };

        let price = adjust(dec!(100), &config).unwrap();
        assert_eq!(price.buy(), Some(dec!(100)));
        assert_eq!(price.sell(), Some(dec!(100)));
    }

    #[test]
    fn zero_config_is_identity() {
        let price = adjust(dec!(61250.5), &SymbolConfig::new("USD")).unwrap();
        assert_eq!(price.single(), Some(dec!(61250.5)));
    }

    #[test]
    fn permits_buy_above_sell_and_negative_prices() {
        let config = SymbolConfig {
            show_buy_sell: true,
            buy_adjustment_value: dec!(500),
            sell_adjustment_percent: dec!(-100),
            sell_adjustment_value: dec!(-1),
            ..SymbolConfig::new("COIN")
        };

        let price = adjust(dec!(1000), &config).unwrap();
        assert_eq!(price.buy(), Some(dec!(1500)));
        assert_eq!(price.sell(), Some(dec!(-1)));
    }

    #[test]
    fn overflowing_adjustment_is_none() {
        let config = SymbolConfig {
            adjustment_percent: dec!(50),
            ..SymbolConfig::new("HUGE")
        };
        let raw = Decimal::from_scientific("6e28").unwrap();

        assert_eq!(adjust(raw, &config), None);
        assert_eq!(apply(Decimal::MAX, Decimal::ZERO, Decimal::ONE), None);
        // Unadjusted values at the top of the range still pass.
        assert_eq!(adjust(raw, &SymbolConfig::new("HUGE")).unwrap().single(), Some(raw));
    }

    #[test]
    fn overflow_on_one_side_drops_the_pair() {
        let config = SymbolConfig {
            show_buy_sell: true,
            sell_adjustment_value: Decimal::MAX,
            ..SymbolConfig::new("USD")
        };
        assert_eq!(adjust(dec!(1), &config), None);
    }
}
