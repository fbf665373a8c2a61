//! Price board refresh and notification engine.
//!
//! Fetches a market price feed on a fixed cadence that survives restarts,
//! shares each snapshot between every running board instance, derives
//! buy/sell prices and tick-to-tick trends, and queues bounded, timed
//! price-movement alerts.

pub mod adjust;
pub mod board;
pub mod clock;
pub mod config;
pub mod countdown;
pub mod error;
pub mod feed;
pub mod models;
pub mod notify;
pub mod scheduler;
pub mod store;
pub mod trend;

pub use error::{PriceBoardError, Result};
