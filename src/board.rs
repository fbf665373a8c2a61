//! The price board engine.
//!
//! [`PriceBoard`] wires one refresh scheduler, the countdown, the alert
//! queue and a frame pipeline around a shared [`BoardStore`]. Consumers
//! read three `watch` streams: rendered frames, visible alerts and the
//! seconds left until the next refresh.
//!
//! Only the instance that fetched a snapshot runs the trend engine. The
//! resulting events are broadcast through the store, so every running
//! board (the fetcher included) queues the same alerts.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adjust::adjust;
use crate::clock::Clock;
use crate::config::BoardConfig;
use crate::countdown::spawn_countdown;
use crate::feed::FeedSource;
use crate::models::price::{DisplayedPrice, Highlight, PriceChangeEvent};
use crate::notify::{NotificationQueue, VisibleAlert, spawn_notification_pump};
use crate::scheduler::{RefreshEvent, RefreshScheduler, RefreshTiming};
use crate::store::{BoardStore, FeedRecord, InstanceId, StoreEvent};
use crate::trend::TrendBook;

/// What the board is currently able to show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardStatus {
    /// Started, nothing fetched or loaded yet.
    #[default]
    Loading,
    /// Showing the latest snapshot.
    Live,
    /// The last fetch failed; the previous snapshot is still shown.
    Stale,
    /// The last fetch failed and there is nothing to show.
    NoData,
}

/// One displayed symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRow {
    pub symbol: String,
    pub name: String,
    pub unit: String,
    pub price: DisplayedPrice,
    pub highlight: Highlight,
}

/// Everything the presentation layer needs to draw the board.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardFrame {
    pub status: BoardStatus,
    pub fetched_at_ms: Option<i64>,
    pub rows: Vec<BoardRow>,
}

impl BoardFrame {
    /// Renders `record` for the configured symbols, in configuration order.
    ///
    /// Symbols missing from the snapshot, or whose adjusted price does not
    /// fit in a `Decimal`, are left out.
    pub fn render(
        status: BoardStatus,
        record: Option<&FeedRecord>,
        config: &BoardConfig,
        trends: &TrendBook,
    ) -> Self {
        let Some(record) = record else {
            return Self {
                status,
                fetched_at_ms: None,
                rows: Vec::new(),
            };
        };

        let rows = config
            .symbols
            .iter()
            .filter_map(|symbol| {
                let Some(item) = record.snapshot.get(&symbol.symbol) else {
                    debug!(symbol = %symbol.symbol, "Configured symbol missing from snapshot");
                    return None;
                };
                let Some(price) = adjust(item.raw_price, symbol) else {
                    warn!(symbol = %symbol.symbol, raw = %item.raw_price, "Adjusted price overflowed; hiding symbol");
                    return None;
                };
                Some(BoardRow {
                    symbol: symbol.symbol.clone(),
                    name: symbol.label(&item.name).to_string(),
                    unit: item.unit.clone(),
                    price,
                    highlight: trends.highlight(&symbol.symbol),
                })
            })
            .collect();

        Self {
            status,
            fetched_at_ms: Some(record.fetched_at_ms),
            rows,
        }
    }

    pub fn row(&self, symbol: &str) -> Option<&BoardRow> {
        self.rows.iter().find(|row| row.symbol == symbol)
    }
}

struct BoardTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// One running price board.
pub struct PriceBoard<S: FeedSource> {
    id: InstanceId,
    config: Arc<BoardConfig>,
    store: BoardStore,
    clock: Clock,
    scheduler: RefreshScheduler<S>,
    frames: watch::Sender<BoardFrame>,
    alerts: watch::Sender<Vec<VisibleAlert>>,
    countdown: watch::Sender<u64>,
    running: Mutex<Option<BoardTasks>>,
}

impl<S: FeedSource> PriceBoard<S> {
    /// Creates a stopped board on the system clock.
    #[must_use]
    pub fn new(config: BoardConfig, store: BoardStore, source: Arc<S>) -> Self {
        Self::with_clock(config, store, source, Clock::System)
    }

    /// Creates a stopped board reading wall-clock time from `clock`.
    #[must_use]
    pub fn with_clock(config: BoardConfig, store: BoardStore, source: Arc<S>, clock: Clock) -> Self {
        let id = InstanceId::next();
        let timing = RefreshTiming {
            ttl: config.ttl(),
            fetch_timeout: config.fetch_timeout(),
        };
        let scheduler = RefreshScheduler::new(id, store.clone(), source, clock, timing);

        Self {
            id,
            config: Arc::new(config),
            store,
            clock,
            scheduler,
            frames: watch::Sender::new(BoardFrame::default()),
            alerts: watch::Sender::new(Vec::new()),
            countdown: watch::Sender::new(0),
            running: Mutex::new(None),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn frames(&self) -> watch::Receiver<BoardFrame> {
        self.frames.subscribe()
    }

    pub fn alerts(&self) -> watch::Receiver<Vec<VisibleAlert>> {
        self.alerts.subscribe()
    }

    pub fn countdown(&self) -> watch::Receiver<u64> {
        self.countdown.subscribe()
    }

    /// Starts every board task. Returns `false` if already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!(instance = self.id.get(), "Board already running");
            return false;
        }

        let trends = match self.store.load_trends().await {
            Ok(trends) => trends,
            Err(e) => {
                warn!(error = %e, "Stored trend state unreadable, starting from scratch");
                TrendBook::new()
            }
        };
        self.frames.send_replace(BoardFrame::default());

        let cancel = CancellationToken::new();
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

        let pump = spawn_notification_pump(
            NotificationQueue::new(self.config.max_visible_popups, self.config.popup_duration()),
            alert_rx,
            self.alerts.clone(),
            cancel.child_token(),
        );
        let countdown = spawn_countdown(
            self.scheduler.schedule(),
            self.countdown.clone(),
            cancel.child_token(),
        );

        let pipeline = Pipeline {
            id: self.id,
            config: Arc::clone(&self.config),
            store: self.store.clone(),
            clock: self.clock,
            frames: self.frames.clone(),
            alerts: alert_tx,
            trends,
            record: None,
            status: BoardStatus::Loading,
        };
        // Subscribe before the scheduler can fetch so our own trend events arrive.
        let bus = self.store.subscribe();
        let pipeline_cancel = cancel.child_token();
        let pipeline = tokio::spawn(pipeline.run(refresh_rx, bus, pipeline_cancel));

        self.scheduler.start(refresh_tx).await;

        *running = Some(BoardTasks {
            cancel,
            handles: vec![pipeline, countdown, pump],
        });
        info!(
            instance = self.id.get(),
            symbols = self.config.symbols.len(),
            "Price board started"
        );
        true
    }

    /// Stops every board task and waits for them. Returns `false` if the
    /// board was not running.
    pub async fn stop(&self) -> bool {
        let tasks = self.running.lock().await.take();
        let Some(tasks) = tasks else {
            return false;
        };

        tasks.cancel.cancel();
        self.scheduler.stop().await;
        for handle in tasks.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Board task ended abnormally");
            }
        }
        info!(instance = self.id.get(), "Price board stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

/// Turns scheduler decisions and store broadcasts into frames and alerts.
struct Pipeline {
    id: InstanceId,
    config: Arc<BoardConfig>,
    store: BoardStore,
    clock: Clock,
    frames: watch::Sender<BoardFrame>,
    alerts: mpsc::UnboundedSender<PriceChangeEvent>,
    trends: TrendBook,
    record: Option<FeedRecord>,
    status: BoardStatus,
}

impl Pipeline {
    async fn run(
        mut self,
        mut refreshes: mpsc::UnboundedReceiver<RefreshEvent>,
        mut bus: broadcast::Receiver<StoreEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                refresh = refreshes.recv() => match refresh {
                    Some(event) => self.on_refresh(event).await,
                    None => break,
                },

                update = bus.recv() => match update {
                    Ok(StoreEvent::TrendsUpdated { origin, events }) => {
                        self.on_trends(origin, events).await;
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Board lagged behind store updates; alerts were dropped");
                        self.reload_trends().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }

            self.publish();
        }
        debug!(instance = self.id.get(), "Board pipeline stopped");
    }

    async fn on_refresh(&mut self, event: RefreshEvent) {
        match event {
            RefreshEvent::Fetched(record) => {
                let events =
                    self.trends
                        .apply_tick(&record.snapshot, &self.config.symbols, self.clock.now_ms());
                self.record = Some(record);
                self.status = BoardStatus::Live;

                if let Err(e) = self
                    .store
                    .save_trends(&self.trends, events.clone(), self.id)
                    .await
                {
                    warn!(error = %e, "Failed to persist trend state; alerting locally");
                    self.enqueue(events);
                }
            }
            RefreshEvent::Cached(record) | RefreshEvent::Adopted(record) => {
                self.record = Some(record);
                self.status = BoardStatus::Live;
                self.reload_trends().await;
            }
            RefreshEvent::FetchFailed { reason, .. } => {
                self.status = if self.record.is_some() {
                    BoardStatus::Stale
                } else {
                    BoardStatus::NoData
                };
                debug!(status = ?self.status, reason = %reason, "Showing fallback after failed fetch");
            }
        }
    }

    async fn on_trends(&mut self, origin: InstanceId, events: Vec<PriceChangeEvent>) {
        if origin != self.id {
            self.reload_trends().await;
        }
        self.enqueue(events);
    }

    async fn reload_trends(&mut self) {
        match self.store.load_trends().await {
            Ok(trends) => self.trends = trends,
            Err(e) => warn!(error = %e, "Failed to reload trend state"),
        }
    }

    fn enqueue(&self, events: Vec<PriceChangeEvent>) {
        for event in events {
            // Closed only while shutting down.
            let _ = self.alerts.send(event);
        }
    }

    fn publish(&self) {
        let frame = BoardFrame::render(self.status, self.record.as_ref(), &self.config, &self.trends);
        self.frames.send_if_modified(|current| {
            if *current == frame {
                return false;
            }
            *current = frame;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::snapshot::{Category, FeedItem, FeedSnapshot};
    use crate::models::symbol::SymbolConfig;
    use rust_decimal_macros::dec;

    fn record() -> FeedRecord {
        let item = |symbol: &str, name: &str, price| FeedItem {
            symbol: symbol.to_string(),
            name: name.to_string(),
            raw_price: price,
            unit: "gram".to_string(),
            category: Category::Metal,
        };
        FeedRecord::new(
            1_000,
            FeedSnapshot {
                items: vec![item("SILVER", "Silver", dec!(50)), item("GOLD", "Gold", dec!(100))],
            },
        )
    }

    fn config() -> BoardConfig {
        BoardConfig::new(
            "http://localhost/feed",
            vec![
                SymbolConfig {
                    adjustment_percent: dec!(10),
                    ..SymbolConfig::new("GOLD")
                },
                SymbolConfig::new("PLATINUM"),
                SymbolConfig {
                    name: "Bar silver".to_string(),
                    ..SymbolConfig::new("SILVER")
                },
            ],
        )
    }

    #[test]
    fn render_follows_configured_order_and_skips_missing() {
        let mut trends = TrendBook::new();
        trends.observe("GOLD", dec!(100), 1);
        trends.observe("GOLD", dec!(110), 2);

        let frame = BoardFrame::render(BoardStatus::Live, Some(&record()), &config(), &trends);

        assert_eq!(frame.fetched_at_ms, Some(1_000));
        let symbols: Vec<&str> = frame.rows.iter().map(|row| row.symbol.as_str()).collect();
        assert_eq!(symbols, ["GOLD", "SILVER"]);

        let gold = frame.row("GOLD").unwrap();
        assert_eq!(gold.name, "Gold");
        assert_eq!(gold.price.single(), Some(dec!(110)));
        assert_eq!(gold.highlight, Highlight::Up);

        let silver = frame.row("SILVER").unwrap();
        assert_eq!(silver.name, "Bar silver");
        assert_eq!(silver.highlight, Highlight::None);
    }

    #[test]
    fn render_without_record_is_empty() {
        let frame = BoardFrame::render(BoardStatus::NoData, None, &config(), &TrendBook::new());
        assert_eq!(frame.status, BoardStatus::NoData);
        assert!(frame.rows.is_empty());
        assert!(frame.fetched_at_ms.is_none());
    }

    #[test]
    fn frame_serializes_for_display() {
        let frame = BoardFrame::render(BoardStatus::Stale, Some(&record()), &config(), &TrendBook::new());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["status"], "stale");
        assert_eq!(json["fetchedAtMs"], 1_000);
        assert_eq!(json["rows"][0]["highlight"], "");
        assert_eq!(json["rows"][0]["price"]["kind"], "single");
    }

    #[test]
    fn render_hides_symbols_whose_price_overflows() {
        let mut record = record();
        record.snapshot.items[1].raw_price = rust_decimal::Decimal::from_scientific("6e28").unwrap();

        let frame = BoardFrame::render(BoardStatus::Live, Some(&record), &config(), &TrendBook::new());
        let symbols: Vec<&str> = frame.rows.iter().map(|row| row.symbol.as_str()).collect();
        assert_eq!(symbols, ["SILVER"]);
    }
}
