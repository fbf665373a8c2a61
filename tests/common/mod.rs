//! Shared test utilities: a scripted feed and snapshot builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rust_decimal::Decimal;

use priceboard::feed::FeedSource;
use priceboard::models::snapshot::{Category, FeedItem, FeedSnapshot};
use priceboard::store::FeedRecord;
use priceboard::{PriceBoardError, Result};

/// Wall-clock time every paused-time test starts at.
pub const BASE_MS: i64 = 1_700_000_000_000;

/// Default refresh interval used by the tests.
pub const TTL: Duration = Duration::from_secs(900);

/// Feed that replays scripted responses and counts calls.
///
/// Responses are consumed in order; the last one repeats forever.
pub struct ScriptedFeed {
    calls: AtomicUsize,
    script: Mutex<VecDeque<std::result::Result<FeedSnapshot, String>>>,
    delay: Duration,
}

impl ScriptedFeed {
    pub fn new(script: Vec<std::result::Result<FeedSnapshot, String>>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(script.into()),
            delay: Duration::ZERO,
        }
    }

    /// Makes every fetch take `delay` of (tokio) time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeedSource for ScriptedFeed {
    async fn fetch(&self) -> Result<FeedSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };

        match next {
            Some(Ok(snapshot)) => Ok(snapshot),
            Some(Err(reason)) => Err(PriceBoardError::MalformedFeed(reason)),
            None => Err(PriceBoardError::MalformedFeed("nothing scripted".to_string())),
        }
    }
}

/// Builds a metal snapshot from `(symbol, price)` pairs.
pub fn snapshot(prices: &[(&str, Decimal)]) -> FeedSnapshot {
    FeedSnapshot {
        items: prices
            .iter()
            .map(|(symbol, price)| FeedItem {
                symbol: symbol.to_string(),
                name: symbol.to_lowercase(),
                raw_price: *price,
                unit: "gram".to_string(),
                category: Category::Metal,
            })
            .collect(),
    }
}

/// A stored record fetched `age` before [`BASE_MS`].
pub fn record_aged(age: Duration, prices: &[(&str, Decimal)]) -> FeedRecord {
    FeedRecord::new(BASE_MS - age.as_millis() as i64, snapshot(prices))
}
