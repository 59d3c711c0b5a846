use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Candle timeframe supported by the quote service.
///
/// String representations match the config file format (e.g. `"1m"`, `"1h"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    Min1,
    Min5,
    Min15,
    Hour1,
    Hour4,
    Day1,
}

impl TimeFrame {
    /// Parse a config-format string into a `TimeFrame`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::Min1),
            "5m" => Some(Self::Min5),
            "15m" => Some(Self::Min15),
            "1h" => Some(Self::Hour1),
            "4h" => Some(Self::Hour4),
            "1d" => Some(Self::Day1),
            _ => None,
        }
    }

    /// Return the config-format string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1d",
        }
    }

    /// Return the kline interval string sent to the quote service.
    pub fn kline_interval(self) -> &'static str {
        self.as_str()
    }

    /// Minimum number of candles a full-history fetch requests for this
    /// timeframe. Longer timeframes carry larger floors so smoothing has
    /// settled by the time the visible window starts.
    pub fn fetch_floor(self) -> usize {
        match self {
            Self::Min1 | Self::Min5 => 60,
            Self::Min15 => 80,
            Self::Hour1 => 100,
            Self::Hour4 => 120,
            Self::Day1 => 150,
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The indicator families the screener can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    Rsi,
    Stochastic,
    WilliamsR,
}

impl IndicatorKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "rsi" => Some(Self::Rsi),
            "stochastic" => Some(Self::Stochastic),
            "williams_r" => Some(Self::WilliamsR),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rsi => "rsi",
            Self::Stochastic => "stochastic",
            Self::WilliamsR => "williams_r",
        }
    }

    /// Prefix for this kind's keys in the parameter store.
    pub fn namespace(self) -> &'static str {
        match self {
            Self::Rsi => "rsi",
            Self::Stochastic => "stoch",
            Self::WilliamsR => "williams",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// One computed indicator value, aligned to the candle it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorPoint {
    pub value: f64,
    pub time: DateTime<Utc>,
}

/// Symbol metadata returned by the quote service's search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    #[allow(dead_code)]
    pub symbol: String,
    #[allow(dead_code)]
    pub name: String,
}

/// An ordered watchlist. Membership is persisted externally; the engine
/// only consumes the ordered list.
#[derive(Debug, Clone)]
pub struct SymbolGroup {
    pub name: String,
    pub symbols: Vec<String>,
}
