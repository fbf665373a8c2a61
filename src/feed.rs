//! Market price feed retrieval.
//!
//! [`FeedSource`] is the seam between the refresh scheduler and the
//! network; [`FeedFetcher`] is the HTTP implementation. One call performs
//! exactly one request and either returns a parsed snapshot or a fetch
//! failure (non-2xx status, timeout, or unparseable body).

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

use crate::Result;
use crate::models::snapshot::{FeedSnapshot, parse_snapshot};

/// Something that can produce one feed snapshot per call.
pub trait FeedSource: Send + Sync + 'static {
    /// Performs one fetch.
    fn fetch(&self) -> impl Future<Output = Result<FeedSnapshot>> + Send;
}

/// Fetches snapshots from the configured HTTP endpoint.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    url: String,
}

impl FeedFetcher {
    /// Builds a fetcher whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`PriceBoardError::Http`](crate::PriceBoardError::Http) if the
    /// HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FeedSource for FeedFetcher {
    async fn fetch(&self) -> Result<FeedSnapshot> {
        debug!(url = %self.url, "Requesting price feed");
        let response = self.client.get(&self.url).send().await?;
        let response = response.error_for_status()?;
        let body = response.text().await?;

        let snapshot = parse_snapshot(&body)?;
        info!(symbols = snapshot.len(), "Fetched price feed");
        Ok(snapshot)
    }
}
