//! Shared data models for feed snapshots, symbol settings and derived prices.

pub mod price;
pub mod snapshot;
pub mod symbol;

pub use price::{DisplayedPrice, Highlight, PriceChangeEvent, TrendState};
pub use snapshot::{Category, FeedItem, FeedSnapshot};
pub use symbol::SymbolConfig;
