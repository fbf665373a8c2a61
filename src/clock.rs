//! Wall-clock source for persisted timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Milliseconds since the Unix epoch, or 0 if the system clock is broken.
pub fn unix_now_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}

/// Wall clock used when stamping and aging persisted state.
///
/// `Anchored` derives wall time from the tokio clock, so it follows
/// `tokio::time::pause`/`advance` in tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Anchored {
        base_ms: i64,
        anchor: Instant,
    },
}

impl Clock {
    /// A clock reading `base_ms` now and advancing with tokio time.
    pub fn anchored(base_ms: i64) -> Self {
        Self::Anchored {
            base_ms,
            anchor: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> i64 {
        match self {
            Clock::System => unix_now_ms(),
            Clock::Anchored { base_ms, anchor } => {
                let elapsed = anchor.elapsed().as_millis().min(i64::MAX as u128) as i64;
                base_ms.saturating_add(elapsed)
            }
        }
    }
}
