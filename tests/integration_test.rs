//! Live feed integration tests.
//!
//! These tests fetch from a real price feed and require network access.
//! Run with: `PRICEBOARD_API_URL=<feed url> cargo test --features integration-tests`

#![cfg(feature = "integration-tests")]

use std::sync::Arc;
use std::time::Duration;

use priceboard::board::{BoardStatus, PriceBoard};
use priceboard::config::BoardConfig;
use priceboard::feed::{FeedFetcher, FeedSource};
use priceboard::models::SymbolConfig;
use priceboard::store::BoardStore;

fn live_url() -> String {
    std::env::var("PRICEBOARD_API_URL").expect("PRICEBOARD_API_URL must point at a live feed")
}

#[tokio::test]
async fn test_fetch_live_feed() {
    let fetcher = FeedFetcher::new(live_url(), Duration::from_secs(30)).unwrap();
    let snapshot = fetcher.fetch().await.expect("Failed to fetch live feed");
    assert!(!snapshot.is_empty());
}

#[tokio::test]
async fn test_board_goes_live() {
    let fetcher = FeedFetcher::new(live_url(), Duration::from_secs(30)).unwrap();
    let snapshot = fetcher.fetch().await.expect("Failed to fetch live feed");
    let symbols = snapshot
        .items
        .iter()
        .take(3)
        .map(|item| SymbolConfig::new(item.symbol.clone()))
        .collect();

    let dir = tempfile::tempdir().unwrap();
    let store = BoardStore::open(dir.path()).await.unwrap();
    let board = PriceBoard::new(
        BoardConfig::new(live_url(), symbols),
        store,
        Arc::new(fetcher),
    );
    board.start().await;

    let frame = tokio::time::timeout(
        Duration::from_secs(35),
        board.frames().wait_for(|frame| frame.status == BoardStatus::Live),
    )
    .await
    .expect("Board did not go live in time")
    .unwrap()
    .clone();
    assert!(!frame.rows.is_empty());

    board.stop().await;
}
