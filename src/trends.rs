//! Trend segmentation pipeline.
//!
//! ```text
//! bars -> smooth -> find_extrema -> segment -> per-segment metrics -> rows
//! ```
//!
//! # Example
//!
//! ```no_run
//! use trendscope::data::{load_csv, DataConfig};
//! use trendscope::smoothing::SmoothingParams;
//! use trendscope::trends::{filter_weak_trends, find_trends};
//!
//! let bars = load_csv("data/AAPL.csv", &DataConfig::default()).unwrap();
//! let analysis = find_trends(&bars, &SmoothingParams::default()).unwrap();
//! for segment in &analysis.segments {
//!     println!(
//!         "#{} {} {} -> {}: ICAGR {:.2}",
//!         segment.number,
//!         segment.direction,
//!         segment.start_time.format("%Y-%m-%d"),
//!         segment.end_time.format("%Y-%m-%d"),
//!         segment.metrics.icagr
//!     );
//! }
//!
//! // Neutralize segments growing slower than 50% a year
//! let strong = filter_weak_trends(&analysis, 0.5);
//! ```

use crate::analytics::{summarize, SummaryStatistics};
use crate::data::validate_series;
use crate::error::{Result, TrendError};
use crate::extrema::find_extrema;
use crate::metrics::{compute_segment_metrics, whole_days, SegmentMetrics};
use crate::segmentation::segment;
use crate::smoothing::{smooth_series, SmoothingParams};
use crate::types::{Bar, TrendDirection};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// One bar augmented with its trend annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRow {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Filtered close.
    pub smoothed: f64,
    pub trend: TrendDirection,
    /// Segment number, 1-based.
    pub n_trend: usize,
    pub trend_start: DateTime<Utc>,
    pub trend_end: DateTime<Utc>,
    /// Segment metrics, present on the first bar of each segment only.
    pub metrics: Option<SegmentMetrics>,
}

/// A trend segment with its metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub number: usize,
    /// First bar index.
    pub start: usize,
    /// Last bar index (inclusive).
    pub end: usize,
    pub direction: TrendDirection,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub metrics: SegmentMetrics,
}

impl Segment {
    /// Number of bars in the segment.
    pub fn bar_count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Result of running the pipeline over one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    /// Smoothing applied; `None` when the caller supplied the smoothed series.
    pub params: Option<SmoothingParams>,
    pub rows: Vec<TrendRow>,
    pub segments: Vec<Segment>,
}

impl TrendAnalysis {
    /// Number of bars.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whole days between the first and last bar.
    pub fn total_days(&self) -> i64 {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => whole_days(first.timestamp, last.timestamp),
            _ => 0,
        }
    }

    /// Trend label of every bar.
    pub fn labels(&self) -> Vec<TrendDirection> {
        self.rows.iter().map(|r| r.trend).collect()
    }

    /// Smoothed close of every bar.
    pub fn smoothed(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.smoothed).collect()
    }

    /// Segment ICAGR carried forward from each segment's first bar.
    pub fn icagr_filled(&self) -> Vec<Option<f64>> {
        let mut current = None;
        self.rows
            .iter()
            .map(|row| {
                if let Some(m) = row.metrics {
                    current = Some(m.icagr);
                }
                current
            })
            .collect()
    }

    /// Stop level implied by each segment's drawdown.
    ///
    /// `close * (1 - max_drawdown * trend)`: below the close in uptrends, above
    /// it in downtrends, equal to it for neutral bars.
    pub fn stop_loss_levels(&self) -> Vec<f64> {
        let mut drawdown = 0.0;
        self.rows
            .iter()
            .map(|row| {
                if let Some(m) = row.metrics {
                    drawdown = m.max_drawdown;
                }
                row.close * (1.0 - drawdown * row.trend.to_numeric())
            })
            .collect()
    }
}

/// Smooth the close, segment the series and compute per-segment metrics.
pub fn find_trends(bars: &[Bar], params: &SmoothingParams) -> Result<TrendAnalysis> {
    params.validate()?;
    validate_series(bars)?;

    let smoothed = smooth_series(bars, params)?;
    build_analysis(bars, smoothed, Some(*params))
}

/// Run the pipeline on an already smoothed close series.
pub fn find_trends_presmoothed(bars: &[Bar], smoothed: Vec<f64>) -> Result<TrendAnalysis> {
    validate_series(bars)?;
    if smoothed.len() != bars.len() {
        return Err(TrendError::DataInvariant(format!(
            "smoothed series has {} values for {} bars",
            smoothed.len(),
            bars.len()
        )));
    }
    build_analysis(bars, smoothed, None)
}

fn build_analysis(
    bars: &[Bar],
    smoothed: Vec<f64>,
    params: Option<SmoothingParams>,
) -> Result<TrendAnalysis> {
    let extrema = find_extrema(&smoothed)?;
    let segmentation = segment(&extrema)?;
    let bounds = segmentation.segments();

    let segments: Vec<Segment> = bounds
        .par_iter()
        .map(|b| -> Result<Segment> {
            let segment_bars = &bars[b.start..=b.end];
            let metrics = compute_segment_metrics(segment_bars, b.direction)?;
            debug!(
                "Segment {} ({}) bars {}..={}: ratio={:.4} icagr={:.4} max_dd={:.4}",
                b.number, b.direction, b.start, b.end, metrics.ratio, metrics.icagr, metrics.max_drawdown
            );
            Ok(Segment {
                number: b.number,
                start: b.start,
                end: b.end,
                direction: b.direction,
                start_time: segment_bars[0].timestamp,
                end_time: segment_bars[segment_bars.len() - 1].timestamp,
                metrics,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::with_capacity(bars.len());
    for seg in &segments {
        for i in seg.start..=seg.end {
            let bar = &bars[i];
            rows.push(TrendRow {
                timestamp: bar.timestamp,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                smoothed: smoothed[i],
                trend: segmentation.labels[i],
                n_trend: seg.number,
                trend_start: seg.start_time,
                trend_end: seg.end_time,
                metrics: (i == seg.start).then_some(seg.metrics),
            });
        }
    }

    info!(
        "Found {} trends over {} bars ({} to {})",
        segments.len(),
        rows.len(),
        bars[0].timestamp.format("%Y-%m-%d"),
        bars[bars.len() - 1].timestamp.format("%Y-%m-%d")
    );

    Ok(TrendAnalysis {
        params,
        rows,
        segments,
    })
}

/// Neutralize the label of every bar whose segment ICAGR is below `min_icagr`.
///
/// Segments and metrics are kept, so applying the filter again changes nothing.
pub fn filter_weak_trends(analysis: &TrendAnalysis, min_icagr: f64) -> TrendAnalysis {
    let filled = analysis.icagr_filled();
    let mut filtered = analysis.clone();
    let mut neutralized = 0;
    for (row, icagr) in filtered.rows.iter_mut().zip(filled) {
        if matches!(icagr, Some(v) if v < min_icagr) && row.trend != TrendDirection::Neutral {
            row.trend = TrendDirection::Neutral;
            neutralized += 1;
        }
    }
    debug!(
        "Weak-trend filter (min ICAGR {}) neutralized {} bars",
        min_icagr, neutralized
    );
    filtered
}

/// Analyse a series and summarize its trends.
pub fn summarise_trends(bars: &[Bar], params: &SmoothingParams) -> Result<SummaryStatistics> {
    let analysis = find_trends(bars, params)?;
    summarize(&analysis)
}

/// Trend analysis and summary of one ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerAnalysis {
    pub ticker: String,
    pub analysis: TrendAnalysis,
    pub summary: SummaryStatistics,
}

/// Analyse many tickers in parallel.
///
/// Each ticker is independent; a failing ticker is logged and reported in its
/// own slot. Results are sorted by ticker.
pub fn analyze_many(
    series: &HashMap<String, Vec<Bar>>,
    params: &SmoothingParams,
) -> Vec<(String, Result<TickerAnalysis>)> {
    info!("Analysing {} tickers", series.len());

    let mut results: Vec<(String, Result<TickerAnalysis>)> = series
        .par_iter()
        .map(|(ticker, bars)| {
            let result = find_trends(bars, params).and_then(|analysis| {
                let summary = summarize(&analysis)?;
                Ok(TickerAnalysis {
                    ticker: ticker.clone(),
                    analysis,
                    summary,
                })
            });
            if let Err(e) = &result {
                warn!("Trend analysis failed for {}: {}", ticker, e);
            }
            (ticker.clone(), result)
        })
        .collect();

    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn close_only_bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Bar::new(
                    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                        + chrono::Duration::days(i as i64),
                    c,
                    c,
                    c,
                    c,
                    1000.0,
                )
            })
            .collect()
    }

    fn wave_bars(count: usize) -> Vec<Bar> {
        let closes: Vec<f64> = (0..count)
            .map(|i| 100.0 + 15.0 * (i as f64 * 0.08).sin() + 0.05 * i as f64)
            .collect();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Bar::new(
                    Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap()
                        + chrono::Duration::days(i as i64),
                    c,
                    c * 1.01,
                    c * 0.99,
                    c,
                    10_000.0,
                )
            })
            .collect()
    }

    fn identity() -> SmoothingParams {
        SmoothingParams::new(0.1, 1, false)
    }

    #[test]
    fn test_monotonic_uptrend() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let analysis = find_trends(&close_only_bars(&closes), &identity()).unwrap();

        assert_eq!(analysis.segments.len(), 1);
        assert!(analysis.rows.iter().all(|r| r.trend == TrendDirection::Up));
        let m = analysis.segments[0].metrics;
        assert_eq!(m.max_drawdown, 0.0);
        assert!(m.bliss.is_none());
    }

    #[test]
    fn test_down_up_cycle() {
        let bars = close_only_bars(&[100.0, 90.0, 80.0, 90.0, 100.0, 110.0]);
        let analysis = find_trends(&bars, &identity()).unwrap();

        assert_eq!(analysis.segments.len(), 2);
        let down = &analysis.segments[0];
        let up = &analysis.segments[1];
        assert_eq!((down.start, down.end, down.direction), (0, 2, TrendDirection::Down));
        assert_eq!((up.start, up.end, up.direction), (3, 5, TrendDirection::Up));

        // Short over 100 -> 80 mirrors to 100 -> 120
        assert!((down.metrics.ratio - 1.2).abs() < 1e-12);
        assert!((up.metrics.ratio - 110.0 / 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_rows_annotated_per_segment() {
        let bars = close_only_bars(&[100.0, 90.0, 80.0, 90.0, 100.0, 110.0]);
        let analysis = find_trends(&bars, &identity()).unwrap();

        assert_eq!(analysis.len(), 6);
        let with_metrics: Vec<usize> = analysis
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.metrics.is_some())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(with_metrics, vec![0, 3]);

        for row in &analysis.rows[3..] {
            assert_eq!(row.n_trend, 2);
            assert_eq!(row.trend_start, bars[3].timestamp);
            assert_eq!(row.trend_end, bars[5].timestamp);
        }
    }

    #[test]
    fn test_smoothing_sigma_validated() {
        let bars = wave_bars(50);
        let params = SmoothingParams::new(0.0, 10, false);
        assert!(matches!(
            find_trends(&bars, &params),
            Err(TrendError::ConfigError(_))
        ));
    }

    #[test]
    fn test_single_bar_rejected() {
        let bars = close_only_bars(&[100.0]);
        assert!(matches!(
            find_trends(&bars, &identity()),
            Err(TrendError::InsufficientData { required: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_smoothed_wave_segments() {
        let bars = wave_bars(400);
        let params = SmoothingParams::new(5.0, 41, false);
        let analysis = find_trends(&bars, &params).unwrap();

        assert!(analysis.segments.len() >= 4);
        assert_eq!(analysis.params, Some(params));
        let total: usize = analysis.segments.iter().map(|s| s.bar_count()).sum();
        assert_eq!(total, bars.len());
        for s in &analysis.segments {
            assert!(s.metrics.max_drawdown >= 0.0);
            assert!(s.metrics.ratio > 0.0);
        }
    }

    #[test]
    fn test_presmoothed_length_checked() {
        let bars = wave_bars(20);
        assert!(matches!(
            find_trends_presmoothed(&bars, vec![1.0; 5]),
            Err(TrendError::DataInvariant(_))
        ));

        let smoothed: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let analysis = find_trends_presmoothed(&bars, smoothed).unwrap();
        assert!(analysis.params.is_none());
    }

    #[test]
    fn test_filter_neutralizes_weak_segments() {
        let bars = close_only_bars(&[100.0, 90.0, 80.0, 81.0, 82.0, 83.0]);
        let analysis = find_trends(&bars, &identity()).unwrap();
        let up_icagr = analysis.segments[1].metrics.icagr;
        let down_icagr = analysis.segments[0].metrics.icagr;
        assert!(down_icagr > up_icagr);

        let threshold = (up_icagr + down_icagr) / 2.0;
        let filtered = filter_weak_trends(&analysis, threshold);
        let labels = filtered.labels();
        assert_eq!(&labels[..3], &[TrendDirection::Down; 3]);
        assert_eq!(&labels[3..], &[TrendDirection::Neutral; 3]);
        // Metrics are untouched
        assert_eq!(filtered.segments, analysis.segments);

        let twice = filter_weak_trends(&filtered, threshold);
        assert_eq!(twice, filtered);
    }

    #[test]
    fn test_stop_loss_levels() {
        let bars = wave_bars(300);
        let analysis = find_trends(&bars, &SmoothingParams::new(4.0, 33, false)).unwrap();
        let stops = analysis.stop_loss_levels();
        assert_eq!(stops.len(), analysis.len());
        for (row, stop) in analysis.rows.iter().zip(&stops) {
            match row.trend {
                TrendDirection::Up => assert!(*stop <= row.close),
                TrendDirection::Down => assert!(*stop >= row.close),
                TrendDirection::Neutral => assert_eq!(*stop, row.close),
            }
        }
    }

    #[test]
    fn test_analyze_many_isolates_failures() {
        let mut series = HashMap::new();
        series.insert("GOOD".to_string(), wave_bars(120));
        series.insert("BAD".to_string(), close_only_bars(&[10.0]));

        let results = analyze_many(&series, &SmoothingParams::new(3.0, 25, false));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "BAD");
        assert!(results[0].1.is_err());
        assert_eq!(results[1].0, "GOOD");
        let good = results[1].1.as_ref().unwrap();
        assert_eq!(good.ticker, "GOOD");
        assert_eq!(good.summary.count, good.analysis.segments.len());
    }
}
