//! Trendscope - trend segmentation and trend quality metrics for price series.
//!
//! # Overview
//!
//! Trendscope splits an OHLCV price series into alternating up and down
//! trends and scores every trend as if a position had been held across it:
//!
//! - **Smoothing**: Gaussian filter of the close with mirrored edges
//! - **Extrema**: peaks and valleys of the smoothed close, plus a terminal one
//! - **Segmentation**: per-bar trend labels and segment boundaries
//! - **Metrics**: ATR, ratio, annualized log growth (ICAGR), drawdown and
//!   Bliss (growth per unit of drawdown) per segment
//! - **Summary**: distribution of trend lengths and compounded growth per series
//! - **Filtering**: neutralize trends below an ICAGR threshold
//! - **Batch analysis**: many tickers in parallel
//! - **Configuration files**: TOML-based configuration for reproducible runs
//!
//! # Quick Start
//!
//! ```no_run
//! use trendscope::{
//!     analytics::summarize,
//!     data::{load_csv, DataConfig},
//!     smoothing::SmoothingParams,
//!     trends::find_trends,
//! };
//!
//! let bars = load_csv("data/AAPL.csv", &DataConfig::default()).unwrap();
//! let analysis = find_trends(&bars, &SmoothingParams::default()).unwrap();
//! let summary = summarize(&analysis).unwrap();
//!
//! println!("Trends: {}", summary.count);
//! println!("ICAGR: {:.3}", summary.icagr);
//! ```
//!
//! # Modules
//!
//! - [`types`]: Core data types (Bar, TrendDirection, ExtremumKind)
//! - [`smoothing`]: Gaussian smoothing
//! - [`extrema`]: Peak and valley detection
//! - [`segmentation`]: Trend labels and segment boundaries
//! - [`metrics`]: Per-segment risk and return metrics
//! - [`trends`]: The segmentation pipeline and weak-trend filter
//! - [`analytics`]: Series summaries and report formatting
//! - [`data`]: Data loading, cleaning and weekly resampling
//! - [`features`]: Rolling price features
//! - [`export`]: CSV and JSON export
//! - [`config`]: TOML configuration file support

pub mod analytics;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod extrema;
pub mod features;
pub mod metrics;
pub mod segmentation;
pub mod smoothing;
pub mod trends;
pub mod types;

// Re-exports for convenience
pub use analytics::{summarize, ResultFormatter, SummaryStatistics};
pub use config::AnalysisFileConfig;
pub use error::{Result, TrendError};
pub use extrema::{find_extrema, Extrema, TerminalRule};
pub use metrics::{compute_segment_metrics, SegmentMetrics, DAYS_PER_YEAR};
pub use segmentation::{segment, SegmentBounds, Segmentation};
pub use smoothing::{smooth, SmoothingParams};
pub use trends::{
    analyze_many, filter_weak_trends, find_trends, find_trends_presmoothed, summarise_trends,
    Segment, TickerAnalysis, TrendAnalysis, TrendRow,
};
pub use types::{Bar, ExtremumKind, TrendDirection};

// Data handling re-exports
pub use data::{
    check_prices, clean_prices, load_csv, load_dir, load_tickers, load_universe, to_weekly,
    validate_series, DataConfig,
};
pub use features::{add_changes, add_technical, compute_features, FeatureConfig, FeatureTable};
