//! Core data types for trend analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV bar representing a single time period of market data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Create a new bar.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Validate that bar data is consistent.
    pub fn validate(&self) -> bool {
        self.invariant_violation().is_none()
    }

    /// Describe the first broken price invariant, if any.
    ///
    /// Prices must be finite and positive, `low <= open, close <= high`, and
    /// volume finite and non-negative.
    pub fn invariant_violation(&self) -> Option<String> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Some(format!("non-finite price at {}", self.timestamp));
        }
        if prices.iter().any(|&p| p <= 0.0) {
            return Some(format!("non-positive price at {}", self.timestamp));
        }
        if self.low > self.open.min(self.close) || self.high < self.open.max(self.close) {
            return Some(format!(
                "open/close outside low-high range at {} (o={}, h={}, l={}, c={})",
                self.timestamp, self.open, self.high, self.low, self.close
            ));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Some(format!("invalid volume {} at {}", self.volume, self.timestamp));
        }
        None
    }

    /// High-low range including a gap from the previous close.
    pub fn true_range(&self, prev_close: f64) -> f64 {
        self.high.max(prev_close) - self.low.min(prev_close)
    }
}

/// Direction of a trend segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendDirection {
    /// Segment ends on a peak; held long.
    Up,
    /// Segment ends on a valley; held short.
    Down,
    /// Label removed by the weak-trend filter.
    Neutral,
}

impl TrendDirection {
    /// Numeric label: +1, -1 or 0.
    pub fn to_numeric(&self) -> f64 {
        match self {
            TrendDirection::Up => 1.0,
            TrendDirection::Down => -1.0,
            TrendDirection::Neutral => 0.0,
        }
    }

    pub fn is_short(&self) -> bool {
        matches!(self, TrendDirection::Down)
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Up => write!(f, "UP"),
            TrendDirection::Down => write!(f, "DOWN"),
            TrendDirection::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Kind of a local extremum of the smoothed series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtremumKind {
    Peak,
    Valley,
}

impl ExtremumKind {
    /// Direction of the trend that an extremum of this kind terminates.
    pub fn closes_trend(&self) -> TrendDirection {
        match self {
            ExtremumKind::Peak => TrendDirection::Up,
            ExtremumKind::Valley => TrendDirection::Down,
        }
    }
}
