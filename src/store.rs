//! Durable board state shared by every running board instance.
//!
//! [`BoardStore`] persists the last good snapshot together with its fetch
//! time (one atomic write) and the per-symbol trend book. Every write is
//! announced on a broadcast bus so other instances holding a clone of the
//! same store can adopt the new state instead of fetching it themselves.
//!
//! Before fetching, an instance claims a short lease through
//! [`BoardStore::try_claim_fetch`]. The claim is refused when the stored
//! snapshot is already fresh or another instance is mid-fetch, so only one
//! instance talks to the upstream feed per refresh interval. Leases live in
//! memory only and lapse on their own if the holder dies.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

use crate::Result;
use crate::models::price::PriceChangeEvent;
use crate::models::snapshot::FeedSnapshot;
use crate::trend::TrendBook;

/// File holding the last snapshot and its fetch time.
pub const FEED_FILE: &str = "feed.json";

/// File holding the per-symbol trend book.
pub const TRENDS_FILE: &str = "trends.json";

/// Capacity of the change bus. Slow subscribers lag rather than block writers.
const BUS_CAPACITY: usize = 64;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one running board instance on the change bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Returns a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// The last good snapshot and when it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    #[serde(rename = "lastFetchedAt")]
    pub fetched_at_ms: i64,
    #[serde(rename = "lastSnapshot")]
    pub snapshot: FeedSnapshot,
}

impl FeedRecord {
    pub fn new(fetched_at_ms: i64, snapshot: FeedSnapshot) -> Self {
        Self {
            fetched_at_ms,
            snapshot,
        }
    }

    /// Time since the fetch, clamped at zero for clocks that moved backwards.
    pub fn age(&self, now_ms: i64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.fetched_at_ms).max(0) as u64)
    }

    /// `true` while no refresh is due.
    pub fn is_fresh(&self, now_ms: i64, ttl: Duration) -> bool {
        self.age(now_ms) < ttl
    }

    /// Time left until a refresh is due (zero once due).
    pub fn remaining(&self, now_ms: i64, ttl: Duration) -> Duration {
        ttl.saturating_sub(self.age(now_ms))
    }
}

/// Change notifications published to every subscriber of a store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A new snapshot was written.
    FeedUpdated { origin: InstanceId, fetched_at_ms: i64 },
    /// A fetch attempt failed; the stored snapshot was left alone.
    FetchFailed {
        origin: InstanceId,
        attempted_at_ms: i64,
    },
    /// The trend book was rewritten after a tick.
    TrendsUpdated {
        origin: InstanceId,
        events: Vec<PriceChangeEvent>,
    },
}

/// Outcome of a fetch-lease claim.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchClaim {
    /// The caller should fetch now.
    Granted,
    /// Another instance already fetched; adopt this record.
    AlreadyFresh(FeedRecord),
    /// Another instance is fetching; its lease lapses at `until_ms`.
    HeldElsewhere { until_ms: i64 },
}

#[derive(Debug, Clone, Copy)]
struct FetchLease {
    holder: InstanceId,
    until_ms: i64,
}

#[derive(Debug)]
enum Backend {
    Memory {
        feed: Mutex<Option<FeedRecord>>,
        trends: Mutex<TrendBook>,
    },
    Directory(PathBuf),
}

#[derive(Debug)]
struct StoreInner {
    backend: Backend,
    lease: Mutex<Option<FetchLease>>,
    bus: broadcast::Sender<StoreEvent>,
}

/// Cloneable handle to the shared board state.
#[derive(Debug, Clone)]
pub struct BoardStore {
    inner: Arc<StoreInner>,
}

impl BoardStore {
    /// A store that lives only as long as its handles. Used for tests and
    /// for embedding where durability is provided elsewhere.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_backend(Backend::Memory {
            feed: Mutex::new(None),
            trends: Mutex::new(TrendBook::new()),
        })
    }

    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PriceBoardError::Io`](crate::PriceBoardError::Io) if the
    /// directory cannot be created.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "Opened board state directory");
        Ok(Self::with_backend(Backend::Directory(dir)))
    }

    fn with_backend(backend: Backend) -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                backend,
                lease: Mutex::new(None),
                bus,
            }),
        }
    }

    /// Subscribes to change notifications from every instance.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.bus.subscribe()
    }

    /// Loads the last good snapshot, if one was ever stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored file exists but cannot be read or
    /// parsed.
    pub async fn load_feed(&self) -> Result<Option<FeedRecord>> {
        match &self.inner.backend {
            Backend::Memory { feed, .. } => Ok(feed.lock().await.clone()),
            Backend::Directory(dir) => read_json(&dir.join(FEED_FILE)).await,
        }
    }

    /// Stores a freshly fetched snapshot, releases the caller's lease and
    /// notifies other instances.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. The lease is released either way.
    pub async fn save_feed(&self, record: &FeedRecord, origin: InstanceId) -> Result<()> {
        {
            let mut lease = self.inner.lease.lock().await;
            release_if_held(&mut lease, origin);

            match &self.inner.backend {
                Backend::Memory { feed, .. } => *feed.lock().await = Some(record.clone()),
                Backend::Directory(dir) => write_json(&dir.join(FEED_FILE), record).await?,
            }
        }

        self.publish(StoreEvent::FeedUpdated {
            origin,
            fetched_at_ms: record.fetched_at_ms,
        });
        Ok(())
    }

    /// Releases the caller's lease after a failed fetch and tells other
    /// instances to wait a full interval as well.
    pub async fn record_fetch_failure(&self, origin: InstanceId, attempted_at_ms: i64) {
        {
            let mut lease = self.inner.lease.lock().await;
            release_if_held(&mut lease, origin);
        }

        self.publish(StoreEvent::FetchFailed {
            origin,
            attempted_at_ms,
        });
    }

    /// Claims the right to perform the next fetch.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored snapshot cannot be read.
    pub async fn try_claim_fetch(
        &self,
        origin: InstanceId,
        now_ms: i64,
        ttl: Duration,
        lease_for: Duration,
    ) -> Result<FetchClaim> {
        let mut lease = self.inner.lease.lock().await;

        if let Some(held) = *lease
            && held.holder != origin
            && held.until_ms > now_ms
        {
            return Ok(FetchClaim::HeldElsewhere {
                until_ms: held.until_ms,
            });
        }

        if let Some(record) = self.load_feed().await?
            && record.is_fresh(now_ms, ttl)
        {
            return Ok(FetchClaim::AlreadyFresh(record));
        }

        *lease = Some(FetchLease {
            holder: origin,
            until_ms: now_ms.saturating_add(lease_for.as_millis().min(i64::MAX as u128) as i64),
        });
        Ok(FetchClaim::Granted)
    }

    /// Loads the trend book (empty if none was stored).
    ///
    /// # Errors
    ///
    /// Returns an error if the stored file exists but cannot be read or
    /// parsed.
    pub async fn load_trends(&self) -> Result<TrendBook> {
        match &self.inner.backend {
            Backend::Memory { trends, .. } => Ok(trends.lock().await.clone()),
            Backend::Directory(dir) => Ok(read_json(&dir.join(TRENDS_FILE))
                .await?
                .unwrap_or_default()),
        }
    }

    /// Stores the trend book after a tick and broadcasts the tick's events.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; nothing is broadcast then.
    pub async fn save_trends(
        &self,
        book: &TrendBook,
        events: Vec<PriceChangeEvent>,
        origin: InstanceId,
    ) -> Result<()> {
        match &self.inner.backend {
            Backend::Memory { trends, .. } => *trends.lock().await = book.clone(),
            Backend::Directory(dir) => write_json(&dir.join(TRENDS_FILE), book).await?,
        }

        self.publish(StoreEvent::TrendsUpdated { origin, events });
        Ok(())
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine: nobody else is running.
        let _ = self.inner.bus.send(event);
    }
}

fn release_if_held(lease: &mut Option<FetchLease>, origin: InstanceId) {
    if lease.is_some_and(|held| held.holder == origin) {
        *lease = None;
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes `value` next to `path` and renames it into place, so readers see
/// either the old or the new contents, never a torn file.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            crate::PriceBoardError::Storage(format!("invalid state path {}", path.display()))
        })?;
    let tmp = path.with_file_name(format!("{file_name}.{}.tmp", std::process::id()));

    tokio::fs::write(&tmp, &json).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        warn!(path = %path.display(), error = %e, "Failed to move state file into place");
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
