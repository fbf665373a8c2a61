use std::sync::Arc;

use priceboard::PriceBoardError;
use priceboard::board::PriceBoard;
use priceboard::config::fetch_config;
use priceboard::feed::FeedFetcher;
use priceboard::store::BoardStore;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), PriceBoardError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let app_config = fetch_config()?;

    let store = BoardStore::open(&app_config.state_dir).await?;
    let fetcher = FeedFetcher::new(&app_config.board.api_url, app_config.board.fetch_timeout())?;
    info!(url = fetcher.url(), state_dir = %app_config.state_dir.display(), "Starting price board");

    let board = PriceBoard::new(app_config.board, store, Arc::new(fetcher));
    let mut frames = board.frames();
    let mut alerts = board.alerts();
    let mut countdown = board.countdown();
    board.start().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }

            Ok(()) = frames.changed() => {
                let frame = frames.borrow_and_update().clone();
                info!(
                    status = ?frame.status,
                    fetched_at_ms = ?frame.fetched_at_ms,
                    rows = frame.rows.len(),
                    "Board updated"
                );
                for row in &frame.rows {
                    info!(
                        symbol = %row.symbol,
                        name = %row.name,
                        price = ?row.price,
                        unit = %row.unit,
                        highlight = row.highlight.as_str(),
                        "Price"
                    );
                }
            }

            Ok(()) = alerts.changed() => {
                for alert in alerts.borrow_and_update().iter() {
                    info!(
                        symbol = %alert.event.symbol,
                        trend = alert.event.trend.as_str(),
                        delta = %alert.event.absolute_delta,
                        percent = %alert.event.percent_delta,
                        "Price alert"
                    );
                }
            }

            Ok(()) = countdown.changed() => {
                let remaining = *countdown.borrow_and_update();
                if remaining % 60 == 0 {
                    info!(remaining_secs = remaining, "Next refresh");
                }
            }
        }
    }

    board.stop().await;
    Ok(())
}
