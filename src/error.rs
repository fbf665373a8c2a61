//! Crate-level error types.
//!
//! [`PriceBoardError`] unifies every error source (configuration, HTTP,
//! JSON, storage) behind a single enum so callers can match on the variant
//! they care about while still using the `?` operator for easy propagation.
//!
//! Feed failures never escape the refresh scheduler; they are reported to
//! the presentation layer as a board status instead.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PriceBoardError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum PriceBoardError {
    /// A configuration value is present but invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// No board configuration has been saved yet.
    #[error("no board configuration found at {0}; save the board settings first")]
    ConfigMissing(String),

    /// The feed request failed (connect, timeout, or non-2xx status).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The feed did not answer within the configured timeout.
    #[error("feed timed out after {0}s")]
    Timeout(u64),

    /// The feed payload parsed as JSON but did not have the expected shape.
    #[error("malformed feed: {0}")]
    MalformedFeed(String),

    /// The durable store rejected a read or write.
    #[error("storage error: {0}")]
    Storage(String),
}

impl PriceBoardError {
    /// Returns `true` for errors produced by a single feed fetch attempt.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Json(_) | Self::Timeout(_) | Self::MalformedFeed(_)
        )
    }
}
