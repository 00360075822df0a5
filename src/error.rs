//! # error
//!
//! Centralised error type for the watcher.
//!
//! Variants are grouped by how the run loop recovers from them: a
//! source-level error means the currently bound exchange is misbehaving as a
//! whole and a full market re-selection is warranted, while
//! [`WatchError::InsufficientData`] only skips the affected timeframe for the
//! current sweep.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    /// Every provider/symbol candidate failed during selection.
    /// Fatal before the first sweep; mid-run it triggers a bounded
    /// wait-and-retry instead of a crash.
    #[error("No working exchange/symbol. Last error: {last}")]
    NoMarketAvailable { last: String },

    /// Transport-level failure talking to an exchange (DNS, timeout, TLS).
    #[error("Exchange request failed: {0}")]
    Exchange(#[from] reqwest::Error),

    /// The exchange answered, but with an HTTP error status or an error
    /// embedded in its response envelope.
    #[error("{provider} returned an error: {detail}")]
    ExchangeStatus { provider: &'static str, detail: String },

    /// The kline payload could not be decoded into candles.
    #[error("Malformed kline payload: {0}")]
    MalformedPayload(String),

    /// Too few candles came back to compute RSI over the lookback window.
    #[error("Insufficient candle data: got {got}, need at least {need}")]
    InsufficientData { got: usize, need: usize },

    /// The notification channel rejected or timed out. Logged by the
    /// notifier and dropped there — never propagated to callers.
    #[error("Notification failed: {0}")]
    Notification(String),
}

impl WatchError {
    /// Whether this error indicts the data source as a whole, in which case
    /// the run loop should re-select the market binding.
    pub fn is_source_level(&self) -> bool {
        matches!(
            self,
            WatchError::Exchange(_)
                | WatchError::ExchangeStatus { .. }
                | WatchError::MalformedPayload(_)
        )
    }
}
