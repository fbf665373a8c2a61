//! Tick-to-tick trend detection.
//!
//! [`TrendBook`] keeps the last reference price and highlight per symbol.
//! The first observation of a symbol only records a baseline; later ticks
//! flip the highlight to up/down when the price moves and leave it alone
//! when the price is unchanged, so a symbol stays marked until it moves
//! again. A move too large to measure in a [`Decimal`] re-baselines the
//! symbol without an event.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adjust::adjust;
use crate::models::price::{Highlight, PriceChangeEvent, TrendState};
use crate::models::snapshot::FeedSnapshot;
use crate::models::symbol::SymbolConfig;

/// Per-symbol trend state, persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrendBook {
    states: HashMap<String, TrendState>,
}

impl TrendBook {
    /// Creates an empty book where every symbol is unobserved.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current highlight for a symbol (`Highlight::None` if unobserved).
    pub fn highlight(&self, symbol: &str) -> Highlight {
        self.states
            .get(symbol)
            .map(|state| state.highlight)
            .unwrap_or_default()
    }

    pub fn get(&self, symbol: &str) -> Option<&TrendState> {
        self.states.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Records one reference price for `symbol`.
    ///
    /// Returns a [`PriceChangeEvent`] only when a previously observed
    /// price moved.
    pub fn observe(
        &mut self,
        symbol: &str,
        reference_price: Decimal,
        now_ms: i64,
    ) -> Option<PriceChangeEvent> {
        let Some(state) = self.states.get_mut(symbol) else {
            self.states.insert(
                symbol.to_string(),
                TrendState {
                    last_reference_price: reference_price,
                    highlight: Highlight::None,
                },
            );
            debug!(symbol, %reference_price, "first observation recorded");
            return None;
        };

        let last = state.last_reference_price;
        if reference_price == last {
            return None;
        }

        let trend = if reference_price > last {
            Highlight::Up
        } else {
            Highlight::Down
        };
        let Some((absolute_delta, percent_delta)) = deltas(last, reference_price) else {
            warn!(symbol, %last, %reference_price, "Price move overflowed; re-baselining");
            state.last_reference_price = reference_price;
            return None;
        };

        state.last_reference_price = reference_price;
        state.highlight = trend;

        Some(PriceChangeEvent {
            symbol: symbol.to_string(),
            trend,
            absolute_delta,
            percent_delta,
            created_at_ms: now_ms,
        })
    }

    /// Runs one completed tick over every configured symbol.
    ///
    /// Symbols missing from the snapshot are left untouched. Events are
    /// returned in configuration order.
    pub fn apply_tick(
        &mut self,
        snapshot: &FeedSnapshot,
        symbols: &[SymbolConfig],
        now_ms: i64,
    ) -> Vec<PriceChangeEvent> {
        symbols
            .iter()
            .filter_map(|config| {
                let item = snapshot.get(&config.symbol)?;
                let Some(price) = adjust(item.raw_price, config) else {
                    warn!(symbol = %config.symbol, raw = %item.raw_price, "Adjusted price overflowed; skipping symbol this tick");
                    return None;
                };
                self.observe(&config.symbol, price.reference_price(), now_ms)
            })
            .collect()
    }
}

/// Absolute and percent change from `last` to `next`, the percent rounded
/// to 2 dp half away from zero (0 when `last` is zero).
fn deltas(last: Decimal, next: Decimal) -> Option<(Decimal, Decimal)> {
    let absolute = next.checked_sub(last)?.abs();
    let percent = if last.is_zero() {
        Decimal::ZERO
    } else {
        absolute
            .checked_div(last.abs())?
            .checked_mul(Decimal::ONE_HUNDRED)?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    };
    Some((absolute, percent))
}
