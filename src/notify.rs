//! Bounded, self-expiring price-movement alerts.
//!
//! [`NotificationQueue`] holds an unbounded FIFO of pending
//! [`PriceChangeEvent`]s and at most `max_visible` visible alerts. An event
//! becomes visible only when a slot is free and leaves only when its
//! display time runs out; nothing is evicted early and repeated symbols are
//! not coalesced.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::price::PriceChangeEvent;

/// Default number of alerts shown at once.
pub const DEFAULT_MAX_VISIBLE: usize = 3;

/// Default time an alert stays on screen.
pub const DEFAULT_POPUP_DURATION: Duration = Duration::from_secs(5);

/// An alert currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleAlert {
    pub event: PriceChangeEvent,
    pub expires_at: Instant,
}

/// FIFO alert queue with a fixed number of visible slots.
#[derive(Debug)]
pub struct NotificationQueue {
    pending: VecDeque<PriceChangeEvent>,
    visible: Vec<VisibleAlert>,
    max_visible: usize,
    duration: Duration,
}

impl NotificationQueue {
    /// Creates an empty queue. A `max_visible` of zero is raised to one.
    #[must_use]
    pub fn new(max_visible: usize, duration: Duration) -> Self {
        let max_visible = max_visible.max(1);
        Self {
            pending: VecDeque::new(),
            visible: Vec::with_capacity(max_visible),
            max_visible,
            duration,
        }
    }

    /// Appends an event and shows it right away if a slot is free.
    pub fn enqueue(&mut self, event: PriceChangeEvent, now: Instant) {
        self.pending.push_back(event);
        self.pump(now);
    }

    /// Moves pending events into free visible slots, oldest first.
    ///
    /// Returns the number of events that became visible.
    pub fn pump(&mut self, now: Instant) -> usize {
        let mut promoted = 0;
        while self.visible.len() < self.max_visible {
            let Some(event) = self.pending.pop_front() else {
                break;
            };
            debug!(symbol = %event.symbol, trend = event.trend.as_str(), "alert shown");
            self.visible.push(VisibleAlert {
                event,
                expires_at: now + self.duration,
            });
            promoted += 1;
        }
        promoted
    }

    /// Drops every visible alert whose time has passed, then refills the
    /// freed slots from the pending queue.
    ///
    /// Returns the number of alerts removed.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.visible.len();
        self.visible.retain(|alert| alert.expires_at > now);
        let removed = before - self.visible.len();
        if removed > 0 {
            self.pump(now);
        }
        removed
    }

    /// Earliest instant at which a visible alert expires.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.visible.iter().map(|alert| alert.expires_at).min()
    }

    pub fn visible(&self) -> &[VisibleAlert] {
        &self.visible
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn max_visible(&self) -> usize {
        self.max_visible
    }

    /// Removes every pending and visible alert.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.visible.clear();
    }
}

/// Spawns the task that feeds events into `queue`, expires alerts on time
/// and publishes the visible set on `alerts` after every change.
///
/// The task exits (clearing the published alerts) when `cancel` fires or
/// the event channel closes.
pub fn spawn_notification_pump(
    mut queue: NotificationQueue,
    mut events: mpsc::UnboundedReceiver<PriceChangeEvent>,
    alerts: watch::Sender<Vec<VisibleAlert>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let next_expiry = queue.next_expiry();
            let expiry = async {
                match next_expiry {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,

                event = events.recv() => match event {
                    Some(event) => queue.enqueue(event, Instant::now()),
                    None => break,
                },

                () = expiry => {
                    queue.expire(Instant::now());
                }
            }

            alerts.send_replace(queue.visible().to_vec());
        }

        queue.clear();
        alerts.send_replace(Vec::new());
        info!("Notification pump stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::price::Highlight;
    use rust_decimal::Decimal;

    fn event(symbol: &str) -> PriceChangeEvent {
        PriceChangeEvent {
            symbol: symbol.to_string(),
            trend: Highlight::Up,
            absolute_delta: Decimal::ONE,
            percent_delta: Decimal::ONE,
            created_at_ms: 0,
        }
    }

    fn symbols(queue: &NotificationQueue) -> Vec<&str> {
        queue
            .visible()
            .iter()
            .map(|alert| alert.event.symbol.as_str())
            .collect()
    }

    #[test]
    fn bounded_visibility_and_fifo_refill() {
        let start = Instant::now();
        let duration = Duration::from_secs(5);
        let mut queue = NotificationQueue::new(3, duration);

        for (i, symbol) in ["A", "B", "C", "D", "E"].iter().enumerate() {
            queue.enqueue(event(symbol), start + Duration::from_millis(i as u64));
        }

        assert_eq!(queue.visible().len(), 3);
        assert_eq!(queue.pending_len(), 2);
        assert_eq!(symbols(&queue), ["A", "B", "C"]);

        // First alert's time is up; exactly one pending event takes its slot.
        let removed = queue.expire(start + duration);
        assert_eq!(removed, 1);
        assert_eq!(symbols(&queue), ["B", "C", "D"]);
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn alerts_stay_until_expiry() {
        let start = Instant::now();
        let mut queue = NotificationQueue::new(3, Duration::from_secs(5));
        queue.enqueue(event("A"), start);

        assert_eq!(queue.expire(start + Duration::from_millis(4_999)), 0);
        assert_eq!(queue.visible().len(), 1);
        assert_eq!(queue.next_expiry(), Some(start + Duration::from_secs(5)));
    }

    #[test]
    fn repeated_symbols_are_not_coalesced() {
        let start = Instant::now();
        let mut queue = NotificationQueue::new(3, Duration::from_secs(5));
        queue.enqueue(event("GOLD"), start);
        queue.enqueue(event("GOLD"), start);
        assert_eq!(symbols(&queue), ["GOLD", "GOLD"]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let queue = NotificationQueue::new(0, Duration::from_secs(1));
        assert_eq!(queue.max_visible(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pump_task_expires_on_time() {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (alerts_tx, mut alerts_rx) = watch::channel(Vec::new());
        let cancel = CancellationToken::new();

        let handle = spawn_notification_pump(
            NotificationQueue::new(3, Duration::from_secs(5)),
            event_rx,
            alerts_tx,
            cancel.clone(),
        );

        for symbol in ["A", "B", "C", "D", "E"] {
            event_tx.send(event(symbol)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(alerts_rx.borrow_and_update().len(), 3);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let visible: Vec<String> = alerts_rx
            .borrow_and_update()
            .iter()
            .map(|alert| alert.event.symbol.clone())
            .collect();
        assert_eq!(visible, ["D", "E"]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(alerts_rx.borrow_and_update().is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
