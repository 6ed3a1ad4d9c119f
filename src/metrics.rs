//! Per-segment risk and return metrics.
//!
//! Each trend segment is evaluated as if a position were held across it:
//! long for an uptrend, short for a downtrend. The short position is modelled
//! by mirroring the price path around the segment's first close, so the same
//! ratio, growth and drawdown formulas apply to both directions.
//!
//! Metrics per segment:
//! - true range statistics (`atr`, `max_tr`, `min_tr`), relative to close
//! - `ratio`: last over first position-adjusted close
//! - `icagr`: annualized log growth, `ln(ratio) * 364.25 / days`
//! - `max_drawdown`: deepest peak-to-trough loss of the adjusted path
//! - `bliss`: `icagr / max_drawdown`, undefined without a drawdown

use crate::error::{Result, TrendError};
use crate::types::{Bar, TrendDirection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Days per year used for annualization.
pub const DAYS_PER_YEAR: f64 = 364.25;

/// Risk/return metrics of one trend segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetrics {
    /// Mean true range.
    pub atr: f64,
    /// Largest true range.
    pub max_tr: f64,
    /// Smallest true range.
    pub min_tr: f64,
    /// Last adjusted close over first adjusted close.
    pub ratio: f64,
    /// Annualized log growth.
    pub icagr: f64,
    /// Maximum drawdown as a non-negative fraction.
    pub max_drawdown: f64,
    /// Growth per unit of drawdown; `None` when the segment never drew down.
    pub bliss: Option<f64>,
}

/// Close/high/low path as seen by the position held over a segment.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionPath {
    pub close: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
}

impl PositionPath {
    /// Build the path for a long (`Up`, `Neutral`) or short (`Down`) position.
    pub fn new(bars: &[Bar], direction: TrendDirection) -> Self {
        if !direction.is_short() {
            return Self {
                close: bars.iter().map(|b| b.close).collect(),
                high: bars.iter().map(|b| b.high).collect(),
                low: bars.iter().map(|b| b.low).collect(),
            };
        }

        let pivot = bars.first().map(|b| b.close).unwrap_or(0.0);
        let mut path = Self {
            close: Vec::with_capacity(bars.len()),
            high: Vec::with_capacity(bars.len()),
            low: Vec::with_capacity(bars.len()),
        };
        for bar in bars {
            let close = 2.0 * pivot - bar.close;
            path.close.push(close);
            // The range below close becomes the range above it
            path.high.push(close + (bar.close - bar.low));
            path.low.push(close - (bar.high - bar.close));
        }
        path
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }
}

/// Running peak/trough state of the drawdown scan.
#[derive(Debug, Clone, Copy)]
struct DrawdownTracker {
    peak: f64,
    low: f64,
    drawdown: f64,
    max_drawdown: f64,
}

impl DrawdownTracker {
    fn start(first_high: f64) -> Self {
        Self {
            peak: first_high,
            low: first_high,
            drawdown: 0.0,
            max_drawdown: 0.0,
        }
    }

    fn update(mut self, high: f64, low: f64) -> Self {
        if high > self.peak {
            self.peak = high;
            self.low = high;
        }
        if low < self.low {
            self.low = low;
            self.drawdown = self.low / self.peak - 1.0;
        }
        self.max_drawdown = self.max_drawdown.min(self.drawdown);
        self
    }
}

/// True range of every bar relative to its close.
///
/// The first bar has no previous close inside the segment and uses its own.
pub fn true_ranges(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let prev_close = if i == 0 { bar.close } else { bars[i - 1].close };
            bar.true_range(prev_close) / bar.close
        })
        .collect()
}

/// Most negative `low / peak - 1` along the path, scanning from the second bar.
pub fn max_drawdown(path: &PositionPath) -> f64 {
    let Some(&first_high) = path.high.first() else {
        return 0.0;
    };
    path.high
        .iter()
        .zip(&path.low)
        .skip(1)
        .fold(DrawdownTracker::start(first_high), |tracker, (&h, &l)| {
            tracker.update(h, l)
        })
        .max_drawdown
}

/// Whole days between two timestamps.
pub fn whole_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_days()
}

/// Annualized log growth for a ratio realised over `days` days.
///
/// Zero when the span is shorter than a day.
pub fn annualized_log_growth(ratio: f64, days: i64) -> f64 {
    if days <= 0 {
        return 0.0;
    }
    ratio.ln() * (DAYS_PER_YEAR / days as f64)
}

/// Compute the metrics of a single segment.
pub fn compute_segment_metrics(bars: &[Bar], direction: TrendDirection) -> Result<SegmentMetrics> {
    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        return Err(TrendError::InsufficientData {
            required: 1,
            actual: 0,
        });
    };

    let tr = true_ranges(bars);
    let atr = tr.iter().sum::<f64>() / tr.len() as f64;
    let max_tr = tr.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_tr = tr.iter().copied().fold(f64::INFINITY, f64::min);

    let path = PositionPath::new(bars, direction);
    if let Some(pos) = path.close.iter().position(|&c| c <= 0.0) {
        return Err(TrendError::DataInvariant(format!(
            "position-adjusted close is not positive at {} ({} segment from {})",
            bars[pos].timestamp, direction, first.timestamp
        )));
    }

    let ratio = path.close[path.len() - 1] / path.close[0];
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(TrendError::DataInvariant(format!(
            "segment ratio {} is not a positive number (segment from {})",
            ratio, first.timestamp
        )));
    }

    let icagr = if bars.len() > 1 {
        annualized_log_growth(ratio, whole_days(first.timestamp, last.timestamp))
    } else {
        0.0
    };

    let drawdown = max_drawdown(&path);
    let bliss = if drawdown != 0.0 {
        Some(-icagr / drawdown)
    } else {
        None
    };

    Ok(SegmentMetrics {
        atr,
        max_tr,
        min_tr,
        ratio,
        icagr,
        max_drawdown: if drawdown < 0.0 { -drawdown } else { 0.0 },
        bliss,
    })
}
