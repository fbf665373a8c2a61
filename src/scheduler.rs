//! The single refresh cadence of a board instance.
//!
//! [`RefreshScheduler`] reconciles wall-clock time with the persisted fetch
//! time on start: a due (or missing) snapshot is fetched immediately,
//! otherwise the cached snapshot is served at once and the first timer is
//! armed for the time that remains. Every attempt, successful or not, arms
//! the next timer a full interval out; failures never retry early.
//!
//! Fetch failures stop here. Consumers only ever see [`RefreshEvent`]s
//! saying whether fresh, adopted, cached or stale data is available.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::feed::FeedSource;
use crate::store::{BoardStore, FeedRecord, FetchClaim, InstanceId, StoreEvent};

/// Extra lease time on top of the fetch timeout, covering the store write.
const LEASE_MARGIN: Duration = Duration::from_secs(5);

/// When a refresh cycle wakes up next.
#[derive(Debug, Clone, Copy)]
enum Wake {
    /// A refresh is due; published as the countdown deadline.
    Refresh(Instant),
    /// Re-check once another instance's fetch lease lapses.
    LeaseExpiry(Instant),
}

impl Wake {
    fn at(self) -> Instant {
        match self {
            Wake::Refresh(at) | Wake::LeaseExpiry(at) => at,
        }
    }
}

/// What the scheduler tells its consumer after each decision.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshEvent {
    /// A still-fresh snapshot was found in the store at start.
    Cached(FeedRecord),
    /// This instance fetched and stored a new snapshot.
    Fetched(FeedRecord),
    /// Another instance fetched a newer snapshot; it was adopted as is.
    Adopted(FeedRecord),
    /// A fetch failed (here or in another instance).
    ///
    /// `has_cache` tells whether a previous snapshot is still being served.
    FetchFailed { has_cache: bool, reason: String },
}

/// Timing settings for a scheduler.
#[derive(Debug, Clone, Copy)]
pub struct RefreshTiming {
    pub ttl: Duration,
    pub fetch_timeout: Duration,
}

struct Shared<S> {
    id: InstanceId,
    store: BoardStore,
    source: Arc<S>,
    clock: Clock,
    timing: RefreshTiming,
    schedule: watch::Sender<Option<Instant>>,
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the refresh timer of one board instance.
pub struct RefreshScheduler<S: FeedSource> {
    shared: Arc<Shared<S>>,
    running: Mutex<Option<RunningTask>>,
}

impl<S: FeedSource> RefreshScheduler<S> {
    /// Creates a stopped scheduler.
    #[must_use]
    pub fn new(
        id: InstanceId,
        store: BoardStore,
        source: Arc<S>,
        clock: Clock,
        timing: RefreshTiming,
    ) -> Self {
        let (schedule, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                id,
                store,
                source,
                clock,
                timing,
                schedule,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.shared.id
    }

    /// Deadline of the next refresh, updated every time a timer is armed.
    pub fn schedule(&self) -> watch::Receiver<Option<Instant>> {
        self.shared.schedule.subscribe()
    }

    /// Starts the refresh cycle, sending decisions to `events`.
    ///
    /// Calling this while already running does nothing and returns `false`,
    /// so there is never more than one refresh timer per scheduler.
    pub async fn start(&self, events: mpsc::UnboundedSender<RefreshEvent>) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            debug!(instance = self.shared.id.get(), "Refresh scheduler already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        // Subscribe before the first store read so no update slips between.
        let bus = shared.store.subscribe();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            Cycle {
                shared,
                events,
                cached: None,
            }
            .run(bus, task_cancel)
            .await;
        });

        *running = Some(RunningTask { cancel, handle });
        true
    }

    /// Stops the refresh cycle and waits for it to wind down.
    ///
    /// Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let task = self.running.lock().await.take();
        let Some(task) = task else {
            return false;
        };

        task.cancel.cancel();
        let _ = task.handle.await;
        self.shared.schedule.send_replace(None);
        info!(instance = self.shared.id.get(), "Refresh scheduler stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }
}

/// State of one running refresh cycle.
struct Cycle<S> {
    shared: Arc<Shared<S>>,
    events: mpsc::UnboundedSender<RefreshEvent>,
    cached: Option<FeedRecord>,
}

impl<S: FeedSource> Cycle<S> {
    async fn run(mut self, mut bus: broadcast::Receiver<StoreEvent>, cancel: CancellationToken) {
        let ttl = self.shared.timing.ttl;
        let now_ms = self.shared.clock.now_ms();

        self.cached = match self.shared.store.load_feed().await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Stored snapshot unreadable, treating as empty");
                None
            }
        };

        let mut wake = match &self.cached {
            Some(record) if record.is_fresh(now_ms, ttl) => {
                let remaining = record.remaining(now_ms, ttl);
                info!(
                    instance = self.shared.id.get(),
                    remaining_secs = remaining.as_secs(),
                    "Serving cached snapshot until next refresh"
                );
                self.emit(RefreshEvent::Cached(record.clone()));
                Wake::Refresh(Instant::now() + remaining)
            }
            _ => Wake::Refresh(Instant::now()),
        };

        loop {
            // A lease wait leaves the countdown on the last real deadline.
            if let Wake::Refresh(deadline) = wake {
                self.shared.schedule.send_if_modified(|current| {
                    let changed = *current != Some(deadline);
                    *current = Some(deadline);
                    changed
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => break,

                () = tokio::time::sleep_until(wake.at()) => {
                    wake = self.refresh_due().await;
                }

                update = bus.recv() => match update {
                    Ok(event) => {
                        if let Some(next) = self.on_store_event(event).await {
                            wake = Wake::Refresh(next);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Scheduler lagged behind store updates");
                        if let Some(next) = self.adopt_stored().await {
                            wake = Wake::Refresh(next);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Runs when the timer fires. Returns when to wake next.
    async fn refresh_due(&mut self) -> Wake {
        let ttl = self.shared.timing.ttl;
        let lease_for = self.shared.timing.fetch_timeout + LEASE_MARGIN;
        let now_ms = self.shared.clock.now_ms();

        match self
            .shared
            .store
            .try_claim_fetch(self.shared.id, now_ms, ttl, lease_for)
            .await
        {
            Ok(FetchClaim::Granted) => {}
            Ok(FetchClaim::AlreadyFresh(record)) => {
                debug!(instance = self.shared.id.get(), "Another instance already refreshed");
                let remaining = record.remaining(now_ms, ttl);
                self.adopt(record);
                return Wake::Refresh(Instant::now() + remaining);
            }
            Ok(FetchClaim::HeldElsewhere { until_ms }) => {
                debug!(instance = self.shared.id.get(), "Another instance is fetching");
                let wait = Duration::from_millis(until_ms.saturating_sub(now_ms).max(0) as u64);
                return Wake::LeaseExpiry(Instant::now() + wait);
            }
            Err(e) => {
                warn!(error = %e, "Fetch claim failed, fetching anyway");
            }
        }

        self.fetch_and_store().await;
        Wake::Refresh(Instant::now() + ttl)
    }

    async fn fetch_and_store(&mut self) {
        let timeout = self.shared.timing.fetch_timeout;
        let result = match tokio::time::timeout(timeout, self.shared.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(crate::PriceBoardError::Timeout(timeout.as_secs())),
        };

        match result {
            Ok(snapshot) => {
                let record = FeedRecord::new(self.shared.clock.now_ms(), snapshot);
                if let Err(e) = self.shared.store.save_feed(&record, self.shared.id).await {
                    warn!(error = %e, "Failed to persist snapshot; serving it from memory");
                }
                info!(
                    instance = self.shared.id.get(),
                    symbols = record.snapshot.len(),
                    "Snapshot refreshed"
                );
                self.cached = Some(record.clone());
                self.emit(RefreshEvent::Fetched(record));
            }
            Err(e) => {
                let has_cache = self.cached.is_some();
                warn!(
                    instance = self.shared.id.get(),
                    error = %e,
                    has_cache,
                    "Feed fetch failed; waiting a full interval"
                );
                self.shared
                    .store
                    .record_fetch_failure(self.shared.id, self.shared.clock.now_ms())
                    .await;
                self.emit(RefreshEvent::FetchFailed {
                    has_cache,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Reacts to another instance's store writes. Returns a new deadline
    /// when the cadence should follow theirs.
    async fn on_store_event(&mut self, event: StoreEvent) -> Option<Instant> {
        match event {
            StoreEvent::FeedUpdated { origin, .. } if origin != self.shared.id => {
                self.adopt_stored().await
            }
            StoreEvent::FetchFailed {
                origin,
                attempted_at_ms,
            } if origin != self.shared.id => {
                let now_ms = self.shared.clock.now_ms();
                let since = Duration::from_millis(now_ms.saturating_sub(attempted_at_ms).max(0) as u64);
                self.emit(RefreshEvent::FetchFailed {
                    has_cache: self.cached.is_some(),
                    reason: "fetch failed in another instance".to_string(),
                });
                Some(Instant::now() + self.shared.timing.ttl.saturating_sub(since))
            }
            _ => None,
        }
    }

    /// Re-reads the store and adopts its snapshot if it is newer.
    async fn adopt_stored(&mut self) -> Option<Instant> {
        let record = match self.shared.store.load_feed().await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read adopted snapshot");
                return None;
            }
        };

        let remaining = record.remaining(self.shared.clock.now_ms(), self.shared.timing.ttl);
        self.adopt(record);
        Some(Instant::now() + remaining)
    }

    fn adopt(&mut self, record: FeedRecord) {
        let newer = self
            .cached
            .as_ref()
            .is_none_or(|current| record.fetched_at_ms > current.fetched_at_ms);
        if !newer {
            return;
        }

        debug!(
            instance = self.shared.id.get(),
            fetched_at_ms = record.fetched_at_ms,
            "Adopted snapshot from another instance"
        );
        self.cached = Some(record.clone());
        self.emit(RefreshEvent::Adopted(record));
    }

    fn emit(&self, event: RefreshEvent) {
        // A closed receiver means the board is shutting down.
        let _ = self.events.send(event);
    }
}
