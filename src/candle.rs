//! # candle
//!
//! Defines [`Candle`], the unified OHLCV bar every exchange client decodes
//! into, and [`Timeframe`], the set of candle intervals the watcher sweeps.

use serde::{Deserialize, Serialize};

/// A single OHLCV candle as decoded from an exchange kline endpoint.
///
/// Timestamps are normalised to epoch **milliseconds** at decode time, so
/// per-timeframe state comparisons stay consistent when a failover switches
/// between second-based and millisecond-based APIs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time of the candle, epoch ms.
    pub ts: i64,

    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,

    /// Volume as reported by the exchange (`0.0` when omitted).
    pub volume: f64,
}

/// Candle intervals the watcher monitors, finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
}

impl Timeframe {
    /// Unified interval label, e.g. `"1m"`, `"4h"`. Used in logs, alert
    /// texts, and as the Binance-style interval code.
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }

    /// Interval length in minutes. Provider-specific interval codes are
    /// derived from this where the API wants minutes or seconds.
    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
