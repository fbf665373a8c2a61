//! Seconds-until-refresh display timer.
//!
//! The countdown only observes the scheduler: it follows the deadline the
//! scheduler publishes and never triggers a fetch, so drift in this 1 Hz
//! ticker cannot disturb the real refresh cadence.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_secs(1);

/// Remaining whole seconds until the next scheduled refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Countdown {
    remaining: u64,
}

impl Countdown {
    pub fn new(remaining: u64) -> Self {
        Self { remaining }
    }

    /// Countdown to `deadline`, rounding partial seconds up.
    pub fn until(deadline: Instant, now: Instant) -> Self {
        let millis = deadline.saturating_duration_since(now).as_millis();
        Self::new(millis.div_ceil(1_000).min(u64::MAX as u128) as u64)
    }

    /// Counts down one second, stopping at zero.
    pub fn tick(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

/// Spawns the 1 Hz countdown task.
///
/// Every new deadline on `schedule` resets the countdown; between resets it
/// decrements once per second. The current value is published on `out`.
pub fn spawn_countdown(
    mut schedule: watch::Receiver<Option<Instant>>,
    out: watch::Sender<u64>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut countdown = match *schedule.borrow_and_update() {
            Some(deadline) => Countdown::until(deadline, Instant::now()),
            None => Countdown::default(),
        };
        out.send_replace(countdown.remaining());

        let mut ticker = tokio::time::interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                changed = schedule.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(deadline) = *schedule.borrow_and_update() {
                        countdown = Countdown::until(deadline, Instant::now());
                        ticker.reset();
                    }
                }

                _ = ticker.tick() => countdown.tick(),
            }

            out.send_replace(countdown.remaining());
        }
    })
}
